/// Clean a text run before it leaves the extractor.
/// Strips control characters, maps no-break spaces to plain spaces and
/// collapses whitespace runs.
pub fn sanitize_fragment(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\t' => ' ',
            other => other,
        })
        .filter(|c| *c == ' ' || !c.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
