use diffcast::diff_block::DiffBlock;
use diffcast::stream::{BlockScanner, ScanEvent};

fn scan(pieces: &[&str]) -> Vec<ScanEvent> {
    let mut scanner = BlockScanner::new();
    let mut events = Vec::new();
    for piece in pieces {
        events.extend(scanner.push(piece));
    }
    events.extend(scanner.finish());
    coalesce(events)
}

/// Merges adjacent plain segments; their split points depend on chunking.
fn coalesce(events: Vec<ScanEvent>) -> Vec<ScanEvent> {
    let mut out: Vec<ScanEvent> = Vec::new();
    for event in events {
        match (out.last_mut(), event) {
            (Some(ScanEvent::Plain(previous)), ScanEvent::Plain(text)) => previous.push_str(&text),
            (_, event) => out.push(event),
        }
    }
    out
}

fn char_pieces(text: &str) -> Vec<String> {
    text.chars().map(String::from).collect()
}

/// Deterministic pseudo-random chunk sizes between 1 and 11 chars.
fn random_pieces(text: &str, seed: u64) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut state = seed;
    let mut pieces = Vec::new();
    let mut index = 0;
    while index < chars.len() {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let size = 1 + ((state >> 33) % 11) as usize;
        let end = (index + size).min(chars.len());
        pieces.push(chars[index..end].iter().collect());
        index = end;
    }
    pieces
}

fn as_refs(pieces: &[String]) -> Vec<&str> {
    pieces.iter().map(String::as_str).collect()
}

fn block(language: &str, path: &str, current: &str, new: &str) -> DiffBlock {
    DiffBlock {
        language: language.to_string(),
        file_path: path.to_string(),
        current_content: current.to_string(),
        new_content: new.to_string(),
    }
}

fn corpus() -> Vec<String> {
    vec![
        String::new(),
        "no fences at all, just `inline` code".to_string(),
        "Here is the fix:\n```ts\n<<<<<<< CURRENT a.ts\nconst x = 1\n=======\nconst x = 2\n>>>>>>> NEW\n```\nDone.".to_string(),
        format!(
            "Two edits:\n{}\nand\n{}\nplus a command:\n```sh\ncargo test\n```\nThat's all.\n",
            block("rust", "src/lib.rs", "fn a() {}", "fn a() -> u8 {\n    1\n}").to_fenced(),
            block("py", "tools/run.py", "    x = 1", "    x = 2").to_fenced(),
        ),
        "Unicode ✓ before\n```md\nçà va ``` mid-line\n```  \nafter é".to_string(),
        "```\nopened at the very start\n```".to_string(),
        "text\n```ts\n<<<<<<< CURRENT a.ts\nold\n=======\n".to_string(),
        "``\nnot a fence\n`` `\n````\nfour backticks open a fence\n```\n".to_string(),
    ]
}

#[test]
fn test_chunking_does_not_change_output() {
    for text in corpus() {
        let whole = scan(&[text.as_str()]);

        let by_char = char_pieces(&text);
        assert_eq!(scan(&as_refs(&by_char)), whole, "char-by-char: {text:?}");

        for seed in [1u64, 7, 42, 1234, 99_991] {
            let pieces = random_pieces(&text, seed);
            assert_eq!(scan(&as_refs(&pieces)), whole, "seed {seed}: {text:?}");
        }
    }
}

#[test]
fn test_header_split_at_every_position() {
    let header = "\n<<<<<<< CURRENT foo.ts\n";
    let rest = "let a = 1;\n=======\nlet a = 2;\n>>>>>>> NEW\n```\n";

    for split in 1..header.len() {
        let first = format!("```ts{}", &header[..split]);
        let second = format!("{}{rest}", &header[split..]);
        let events = scan(&[&first, &second]);

        let blocks: Vec<&DiffBlock> = events
            .iter()
            .filter_map(|event| match event {
                ScanEvent::Diff(block) => Some(block),
                _ => None,
            })
            .collect();
        assert_eq!(blocks.len(), 1, "split at {split}");
        assert_eq!(blocks[0].file_path, "foo.ts");
        assert_eq!(blocks[0].current_content, "let a = 1;");
        assert_eq!(blocks[0].new_content, "let a = 2;");
    }
}

#[test]
fn test_three_chunk_example() {
    let events = scan(&[
        "Here is the fix:\n```ts\n<<<<<<< CURRENT a.ts\nconst x = 1\n",
        "=======\nconst x = 2\n",
        ">>>>>>> NEW\n```\nDone.",
    ]);
    assert_eq!(
        events,
        vec![
            ScanEvent::Plain("Here is the fix:\n".to_string()),
            ScanEvent::CodeStarted,
            ScanEvent::CodeEnded,
            ScanEvent::Diff(block("ts", "a.ts", "const x = 1", "const x = 2")),
            ScanEvent::Plain("\nDone.".to_string()),
        ]
    );
}

#[test]
fn test_several_regions_in_one_append_keep_order() {
    let first = block("ts", "a.ts", "a", "b");
    let second = block("ts", "b.ts", "c", "d");
    let text = format!("{}\n{}\n```sh\nls\n```\nend", first.to_fenced(), second.to_fenced());

    let events = scan(&[&text]);
    assert_eq!(
        events,
        vec![
            ScanEvent::CodeStarted,
            ScanEvent::CodeEnded,
            ScanEvent::Diff(first),
            ScanEvent::Plain("\n".to_string()),
            ScanEvent::CodeStarted,
            ScanEvent::CodeEnded,
            ScanEvent::Diff(second),
            ScanEvent::Plain("\n".to_string()),
            ScanEvent::CodeStarted,
            ScanEvent::CodeEnded,
            ScanEvent::RawCode("```sh\nls\n```".to_string()),
            ScanEvent::Plain("\nend".to_string()),
        ]
    );
}

#[test]
fn test_plain_and_regions_reconstruct_input() {
    let text = format!(
        "intro ✓\n{}\nmiddle\n```json\n{{\"a\": 1}}\n```\nouter",
        block("rs", "src/main.rs", "fn main() {}", "fn main() {\n    run();\n}").to_fenced()
    );

    for pieces in [vec![text.clone()], random_pieces(&text, 5), char_pieces(&text)] {
        let rebuilt: String = scan(&as_refs(&pieces))
            .into_iter()
            .filter_map(|event| match event {
                ScanEvent::Plain(text) | ScanEvent::RawCode(text) => Some(text),
                ScanEvent::Diff(block) => Some(block.to_fenced()),
                ScanEvent::Malformed { raw, .. } => Some(raw),
                ScanEvent::Unterminated(raw) => Some(raw),
                ScanEvent::CodeStarted | ScanEvent::CodeEnded => None,
            })
            .collect();
        assert_eq!(rebuilt, text);
    }
}

#[test]
fn test_incomplete_block_is_never_a_diff() {
    let events = scan(&["```ts\n<<<<<<< CURRENT a.ts\nold\n=======\nnew\n"]);
    assert!(events.iter().all(|event| !matches!(event, ScanEvent::Diff(_))));
    assert!(matches!(events.last(), Some(ScanEvent::Unterminated(_))));
}
