use std::sync::LazyLock;

use core_model::CommandTags;
use regex::Regex;

static COMMAND_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<command-name>(.*?)</command-name>").unwrap());
static COMMAND_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<command-message>(.*?)</command-message>").unwrap());
static COMMAND_ARGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<command-args>(.*?)</command-args>").unwrap());
static COMMAND_STDOUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<local-command-stdout>(.*?)</local-command-stdout>").unwrap()
});

pub const STDOUT_MARKER: &str = "<local-command-stdout>";

/// Either tag may come first; newer logs lead with `<command-message>`.
pub fn is_command(text: &str) -> bool {
    let text = text.trim_start();
    text.starts_with("<command-name>") || text.starts_with("<command-message>")
}

pub fn is_stdout(text: &str) -> bool {
    text.trim_start().starts_with(STDOUT_MARKER)
}

pub fn command_tags(text: &str) -> CommandTags {
    CommandTags {
        name: capture(&COMMAND_NAME, text),
        display_name: capture(&COMMAND_MESSAGE, text),
        args: capture(&COMMAND_ARGS, text),
    }
}

pub fn stdout_text(text: &str) -> Option<String> {
    capture(&COMMAND_STDOUT, text)
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_three_tags() {
        let tags = command_tags(
            "<command-name>/add-dir</command-name>\n<command-message>add-dir</command-message>\n<command-args>src/lib</command-args>",
        );
        assert_eq!(tags.name.as_deref(), Some("/add-dir"));
        assert_eq!(tags.display_name.as_deref(), Some("add-dir"));
        assert_eq!(tags.args.as_deref(), Some("src/lib"));
    }

    #[test]
    fn missing_tags_are_none() {
        let tags = command_tags("<command-message>review</command-message>\n<command-name>/review</command-name>");
        assert_eq!(tags.name.as_deref(), Some("/review"));
        assert_eq!(tags.display_name.as_deref(), Some("review"));
        assert_eq!(tags.args, None);
    }

    #[test]
    fn empty_tag_is_empty_string() {
        let tags = command_tags("<command-name>/init</command-name><command-args></command-args>");
        assert_eq!(tags.args.as_deref(), Some(""));
    }

    #[test]
    fn match_is_non_greedy_and_multiline() {
        let text = "<command-args>line one\nline two</command-args> <command-args>second</command-args>";
        assert_eq!(
            command_tags(text).args.as_deref(),
            Some("line one\nline two")
        );
    }

    #[test]
    fn command_detection_accepts_either_leading_tag() {
        assert!(is_command("<command-name>/init</command-name>"));
        assert!(is_command("<command-message>init</command-message>"));
        assert!(!is_command("please run <command-name>/init</command-name>"));
    }

    #[test]
    fn stdout_extraction() {
        assert!(is_stdout("<local-command-stdout>done</local-command-stdout>"));
        assert_eq!(
            stdout_text("<local-command-stdout>done</local-command-stdout>").as_deref(),
            Some("done")
        );
        assert_eq!(
            stdout_text("<local-command-stdout></local-command-stdout>").as_deref(),
            Some("")
        );
    }
}
