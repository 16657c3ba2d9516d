//! The `mathexam init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    let path = Path::new("mathexam.toml");
    if path.exists() {
        println!("mathexam.toml already exists, skipping.");
        return Ok(());
    }

    std::fs::write(path, SAMPLE_CONFIG)?;
    println!("Created mathexam.toml");

    println!("\nNext steps:");
    println!("  1. Export OPENAI_API_KEY to enable AI-generated questions (optional)");
    println!("  2. Run: mathexam generate --num-questions 5 --output exam.json");
    println!("  3. Run: mathexam score --exam exam.json --answers answers.json");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# mathexam configuration

data_dir = "./data"
default_topics = ["Algebra", "Functions", "Integrals", "Derivatives", "Geometry"]
default_difficulty = "medium"
default_num_questions = 10

[openai]
# Leave empty to serve every exam from the built-in templates.
api_key = "${OPENAI_API_KEY}"
base_url = "https://api.openai.com"
model = "gpt-4o-mini"
temperature = 0.7
max_tokens = 1200
summary_max_tokens = 200
timeout_secs = 60
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_parses_as_toml() {
        let value: toml::Value = toml::from_str(SAMPLE_CONFIG).unwrap();
        assert_eq!(value["default_num_questions"].as_integer(), Some(10));
        assert_eq!(value["openai"]["model"].as_str(), Some("gpt-4o-mini"));
    }
}
