/// Maps a display language name ("Tamazight (Tifinagh)", "Arabic") to the code the
/// model was trained with. Unrecognized names are lower-cased.
pub fn model_language_code(display: &str) -> String {
    const KNOWN: [(&str, &str); 4] = [
        ("Tamazight", "tamazight"),
        ("Arabic", "arabic"),
        ("French", "french"),
        ("English", "english"),
    ];
    for (needle, code) in KNOWN {
        if display.contains(needle) {
            return code.to_string();
        }
    }
    display.to_lowercase()
}
