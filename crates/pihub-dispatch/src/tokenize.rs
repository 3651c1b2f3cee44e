//! Splitting a raw command line into target, action and arguments.

use crate::error::{DispatchError, DispatchResult};
use crate::{ACTION_MAX, ARG_MAX, MAX_ARGS, TARGET_MAX};

/// A command split into its constituent tokens.
///
/// Borrows from the input buffer; built inside one `execute` call and
/// consumed there, never stored.
#[derive(Debug)]
pub(crate) struct TokenizedCommand<'a> {
    pub target: &'a str,
    pub action: &'a str,
    pub args: Vec<&'a str>,
}

/// Splits `input` on the delimiter set.
///
/// Every byte of the delimiter string acts as a separator, and runs of
/// separators collapse, so `"gpio   set"` parses the same as
/// `"gpio set"`. The first token becomes the target, the second the
/// action, the rest the argument vector.
pub(crate) fn tokenize<'a>(
    input: &'a str,
    delimiter: &str,
) -> DispatchResult<TokenizedCommand<'a>> {
    let mut tokens = input
        .split(|c: char| delimiter.contains(c))
        .filter(|t| !t.is_empty());

    let target = tokens.next().ok_or(DispatchError::BufEmpty)?;
    if target.len() >= TARGET_MAX {
        return Err(DispatchError::TokenTooLong);
    }

    let action = tokens.next().ok_or(DispatchError::CmdIncomplete)?;
    if action.len() >= ACTION_MAX {
        return Err(DispatchError::TokenTooLong);
    }

    let mut args = Vec::new();
    for token in tokens {
        if args.len() == MAX_ARGS {
            return Err(DispatchError::TooManyArgs);
        }
        if token.len() >= ARG_MAX {
            return Err(DispatchError::TokenTooLong);
        }
        args.push(token);
    }

    Ok(TokenizedCommand {
        target,
        action,
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_target_action_and_args() {
        let cmd = tokenize("gpio set 13 1", " ").unwrap();
        assert_eq!(cmd.target, "gpio");
        assert_eq!(cmd.action, "set");
        assert_eq!(cmd.args, vec!["13", "1"]);
    }

    #[test]
    fn no_args_is_valid() {
        let cmd = tokenize("server status", " ").unwrap();
        assert_eq!(cmd.target, "server");
        assert_eq!(cmd.action, "status");
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn delimiter_runs_collapse() {
        let cmd = tokenize("gpio    set   7", " ").unwrap();
        assert_eq!(cmd.target, "gpio");
        assert_eq!(cmd.action, "set");
        assert_eq!(cmd.args, vec!["7"]);
    }

    #[test]
    fn delimiter_string_is_a_set() {
        let cmd = tokenize("gpio,set, 7", ", ").unwrap();
        assert_eq!(cmd.target, "gpio");
        assert_eq!(cmd.action, "set");
        assert_eq!(cmd.args, vec!["7"]);
    }

    #[test]
    fn leading_and_trailing_delimiters_ignored() {
        let cmd = tokenize("  sensor list  ", " ").unwrap();
        assert_eq!(cmd.target, "sensor");
        assert_eq!(cmd.action, "list");
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn empty_input_rejected() {
        assert_eq!(tokenize("", " ").unwrap_err(), DispatchError::BufEmpty);
    }

    #[test]
    fn delimiter_only_input_rejected() {
        assert_eq!(tokenize("    ", " ").unwrap_err(), DispatchError::BufEmpty);
    }

    #[test]
    fn missing_action_rejected() {
        assert_eq!(
            tokenize("gpio", " ").unwrap_err(),
            DispatchError::CmdIncomplete
        );
        assert_eq!(
            tokenize("gpio   ", " ").unwrap_err(),
            DispatchError::CmdIncomplete
        );
    }

    #[test]
    fn target_at_limit_rejected() {
        let target = "t".repeat(TARGET_MAX);
        let input = format!("{target} set");
        assert_eq!(
            tokenize(&input, " ").unwrap_err(),
            DispatchError::TokenTooLong
        );
    }

    #[test]
    fn target_below_limit_accepted() {
        let target = "t".repeat(TARGET_MAX - 1);
        let input = format!("{target} set");
        let cmd = tokenize(&input, " ").unwrap();
        assert_eq!(cmd.target.len(), TARGET_MAX - 1);
    }

    #[test]
    fn action_at_limit_rejected() {
        let action = "a".repeat(ACTION_MAX);
        let input = format!("gpio {action}");
        assert_eq!(
            tokenize(&input, " ").unwrap_err(),
            DispatchError::TokenTooLong
        );
    }

    #[test]
    fn argument_at_limit_rejected() {
        let arg = "x".repeat(ARG_MAX);
        let input = format!("gpio set {arg}");
        assert_eq!(
            tokenize(&input, " ").unwrap_err(),
            DispatchError::TokenTooLong
        );
    }

    #[test]
    fn max_args_accepted_one_more_rejected() {
        let ten = (0..MAX_ARGS).map(|i| i.to_string()).collect::<Vec<_>>();
        let input = format!("gpio set {}", ten.join(" "));
        let cmd = tokenize(&input, " ").unwrap();
        assert_eq!(cmd.args.len(), MAX_ARGS);

        let input = format!("{input} extra");
        assert_eq!(
            tokenize(&input, " ").unwrap_err(),
            DispatchError::TooManyArgs
        );
    }
}
