/// Marker replaced by the shell's own pid.
pub const PID_MARKER: &str = "$$";

/// Tokenizes shell input into a vector of strings.
/// Splits on runs of whitespace only: quotes and backslashes are ordinary characters.
pub fn tokenize(input: &str) -> Vec<String> {
    input.split_whitespace().map(str::to_string).collect()
}

/// Replaces every `$$` in every token with `pid`.
pub fn expand_pid(tokens: Vec<String>, pid: u32) -> Vec<String> {
    let pid = pid.to_string();
    tokens
        .into_iter()
        .map(|token| {
            if token.contains(PID_MARKER) {
                token.replace(PID_MARKER, &pid)
            } else {
                token
            }
        })
        .collect()
}
