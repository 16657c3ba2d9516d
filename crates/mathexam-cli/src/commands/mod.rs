pub mod generate;
pub mod init;
pub mod score;
pub mod weak_topics;

/// Split a comma-separated topic list, or fall back to `defaults`.
pub fn parse_topics(topics: Option<&str>, defaults: &[String]) -> Vec<String> {
    match topics {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
        None => defaults.to_vec(),
    }
}
