//! Shell completion generation.

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io;

use crate::Cli;

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(shell: Shell) -> String {
        let mut cmd = Cli::command();
        let mut buf = Vec::new();
        generate(shell, &mut cmd, "scalelink", &mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_bash_completions_mention_subcommands() {
        let script = render(Shell::Bash);
        assert!(script.contains("scalelink"));
        assert!(script.contains("list-ports"));
        assert!(script.contains("decode"));
    }

    #[test]
    fn test_zsh_and_fish_completions_generate() {
        assert!(!render(Shell::Zsh).is_empty());
        assert!(render(Shell::Fish).contains("scalelink"));
    }
}
