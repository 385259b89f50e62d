//! # Command Resolver
//!
//! Routes one step of a command string against the module tree. The
//! Context drives the loop; this module decides what a single token
//! matches. The rules, in order of precedence:
//!
//! 1.  **Literal module**: `dir/name` loads as a command module.
//! 2.  **Directory**: `dir/name` is a directory with no executable module;
//!     a pass-through module is synthesized and its children become the
//!     next search root.
//! 3.  **Route parameters**: the entries of `dir` are scanned in directory
//!     order for `[param]` (captures the token) or `[...param]` (captures
//!     the token and everything after it). First match wins.
//! 4.  Otherwise the token does not resolve.
//!
//! Literal lookup only happens for tokens matching the command-name
//! pattern; anything else (dots, slashes, exotic characters) can only be
//! captured by a route parameter, which keeps loader paths well-formed.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use crate::constants::{
    COMMAND_NAME_PATTERN, LOG_TARGET, OPTION_TERMINATOR, PARAM_CLOSE, PARAM_OPEN, REST_PARAM_OPEN,
};
use crate::core::{parser, tokens};
use crate::errors::{CliError, UsageError};
use crate::models::{CommandModule, Handler, ParamValue, Params, ResolvedCommand};
use crate::system::loader::ModuleLoader;

lazy_static! {
    static ref COMMAND_NAME_RE: Regex =
        Regex::new(COMMAND_NAME_PATTERN).expect("command name pattern is valid");
}

/// Resolves the first command of `input` against `dir`.
///
/// On success the returned command carries the continuation cursor: a
/// non-empty `remaining_command_string` means another step follows,
/// rooted at `subcommands_dir`.
pub fn resolve_step(
    input: &str,
    dir: &Path,
    loader: &dyn ModuleLoader,
) -> Result<ResolvedCommand, CliError> {
    let all_tokens = tokens::split(input);
    let Some(position) = all_tokens
        .iter()
        .position(|t| !parser::is_flag(t) && t != OPTION_TERMINATOR)
    else {
        return Err(CliError::CommandRequired);
    };

    let name = all_tokens[position].clone();
    let mut rest: Vec<String> = all_tokens[position + 1..].to_vec();
    let mut params = Params::new();
    let mut command_tokens = vec![name.clone()];

    let literal_ok = COMMAND_NAME_RE.is_match(&name);
    let literal_path = dir.join(&name);

    // Rules 1 and 2: literal module, then traversed directory.
    let mut matched: Option<(CommandModule, std::path::PathBuf)> = None;
    if literal_ok {
        if let Some(module) = loader.load(&literal_path)? {
            matched = Some((module, literal_path.clone()));
        } else if loader.is_dir(&literal_path) {
            matched = Some((CommandModule::pass_through(), literal_path.clone()));
        }
    }

    // Rule 3: route parameters, in directory order.
    if matched.is_none() {
        for entry in loader.entries(dir) {
            if let Some(param) = rest_param_name(&entry) {
                let mut captured = vec![name.clone()];
                captured.extend(rest.iter().cloned());
                params.insert(param, ParamValue::Rest(captured.clone()));
                command_tokens = captured;
                rest.clear();

                let path = dir.join(&entry);
                matched = Some((load_matched_entry(loader, &path)?, path));
                break;
            }
            if let Some(param) = single_param_name(&entry) {
                params.insert(param, ParamValue::Single(name.clone()));
                let path = dir.join(&entry);
                matched = Some((load_matched_entry(loader, &path)?, path));
                break;
            }
        }
    }

    let Some((mut module, path)) = matched else {
        if !literal_ok {
            return Err(UsageError::InvalidCommandName { name }.into());
        }
        return Err(CliError::NotFound {
            name,
            dir: dir.to_path_buf(),
        });
    };

    // Trim leading flags off the remaining string so an option (or its
    // value) is never mistaken for a subcommand name.
    if !module.options.is_empty() && !rest.is_empty() {
        let span = parser::leading_flag_span(&rest, &module.options);
        rest.drain(..span);
    }
    let remaining = tokens::join(&rest);

    // A non-middleware command in non-terminal position only exists to
    // forward data.
    if !module.is_middleware && !remaining.trim().is_empty() {
        module.handler = Handler::pass_through();
    }

    log::debug!(
        target: LOG_TARGET,
        "resolved '{}' at '{}' (remaining: '{}')",
        name,
        path.display(),
        remaining
    );

    Ok(ResolvedCommand {
        command: module,
        command_name: name,
        command_path: path.clone(),
        command_tokens,
        remaining_command_string: remaining,
        subcommands_dir: path,
        params,
    })
}

fn rest_param_name(entry: &str) -> Option<&str> {
    entry
        .strip_prefix(REST_PARAM_OPEN)
        .and_then(|s| s.strip_suffix(PARAM_CLOSE))
}

fn single_param_name(entry: &str) -> Option<&str> {
    entry
        .strip_prefix(PARAM_OPEN)
        .and_then(|s| s.strip_suffix(PARAM_CLOSE))
}

/// Loads an entry that matched a route parameter. A directory without an
/// executable module is a pass-through parent; an entry the loader listed
/// but cannot load is a loader inconsistency.
fn load_matched_entry(
    loader: &dyn ModuleLoader,
    path: &Path,
) -> Result<CommandModule, CliError> {
    if let Some(module) = loader.load(path)? {
        return Ok(module);
    }
    if loader.is_dir(path) {
        return Ok(CommandModule::pass_through());
    }
    Err(CliError::MissingModule {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OptionDecl;
    use crate::system::loader::StaticLoader;

    fn noop() -> CommandModule {
        CommandModule::new(|_| Ok(()))
    }

    fn root() -> std::path::PathBuf {
        std::path::PathBuf::from("commands")
    }

    #[test]
    fn test_resolves_a_literal_leaf() {
        let loader = StaticLoader::new().module("hello", noop());
        let resolved = resolve_step("hello --name Alice", &root(), &loader).unwrap();

        assert_eq!(resolved.command_name, "hello");
        assert_eq!(resolved.command_tokens, vec!["hello"]);
        assert_eq!(resolved.remaining_command_string, "--name Alice");
        assert!(resolved.has_continuation());
    }

    #[test]
    fn test_traversed_directory_becomes_pass_through() {
        let loader = StaticLoader::new().module("users/list", noop());
        let resolved = resolve_step("users list", &root(), &loader).unwrap();

        assert_eq!(resolved.command_name, "users");
        assert_eq!(resolved.subcommands_dir, root().join("users"));
        assert_eq!(resolved.remaining_command_string, "list");
    }

    #[test]
    fn test_single_param_captures_the_token() {
        let loader = StaticLoader::new().module("users/[id]/delete", noop());
        let step = resolve_step("users 123 delete", &root(), &loader).unwrap();
        let step = resolve_step(
            &step.remaining_command_string,
            &step.subcommands_dir,
            &loader,
        )
        .unwrap();

        assert_eq!(step.params.get("id").unwrap().as_str(), Some("123"));
        assert_eq!(step.remaining_command_string, "delete");
        assert_eq!(step.subcommands_dir, root().join("users/[id]"));
    }

    #[test]
    fn test_rest_param_captures_everything_and_empties_remaining() {
        let loader = StaticLoader::new().module("cat/[...files]", noop());
        let step = resolve_step("cat a.txt b.txt", &root(), &loader).unwrap();
        let step = resolve_step(
            &step.remaining_command_string,
            &step.subcommands_dir,
            &loader,
        )
        .unwrap();

        assert_eq!(
            step.params.get("files").unwrap().as_tokens().unwrap(),
            &["a.txt".to_string(), "b.txt".to_string()]
        );
        assert!(!step.has_continuation());
        assert_eq!(step.command_tokens, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_first_matching_param_entry_wins() {
        let loader = StaticLoader::new()
            .module("get/[key]", noop())
            .module("get/[...rest]", noop());
        let step = resolve_step("get alpha", &root(), &loader).unwrap();
        let step = resolve_step(
            &step.remaining_command_string,
            &step.subcommands_dir,
            &loader,
        )
        .unwrap();

        assert!(step.params.get("key").is_some());
        assert!(step.params.get("rest").is_none());
    }

    #[test]
    fn test_unknown_token_is_not_found() {
        let loader = StaticLoader::new().module("hello", noop());
        let err = resolve_step("goodbye", &root(), &loader).unwrap_err();
        assert!(matches!(err, CliError::NotFound { .. }));
        assert!(err.to_string().contains("goodbye"));
    }

    #[test]
    fn test_empty_input_requires_a_command() {
        let loader = StaticLoader::new().module("hello", noop());
        let err = resolve_step("", &root(), &loader).unwrap_err();
        assert!(matches!(err, CliError::CommandRequired));
    }

    #[test]
    fn test_invalid_name_without_param_fallback_is_a_usage_error() {
        let loader = StaticLoader::new().module("hello", noop());
        let err = resolve_step("../escape", &root(), &loader).unwrap_err();
        assert!(matches!(
            err,
            CliError::Usage(UsageError::InvalidCommandName { .. })
        ));
    }

    #[test]
    fn test_leading_flags_are_trimmed_from_remaining() {
        let module = noop().option("env", OptionDecl::string());
        let loader = StaticLoader::new()
            .module("deploy", module)
            .module("deploy/status", noop());

        let step = resolve_step("deploy --env prod status", &root(), &loader).unwrap();
        assert_eq!(step.remaining_command_string, "status");
    }

    #[test]
    fn test_non_middleware_with_continuation_forwards_only() {
        let loader = StaticLoader::new()
            .module("top", noop().non_middleware())
            .module("top/sub", noop());

        let step = resolve_step("top sub", &root(), &loader).unwrap();
        assert!(step.has_continuation());
        // The replacement handler is the pass-through; invoking it is
        // covered by the Context execution tests.
        assert!(!step.command.is_middleware);
    }

    #[test]
    fn test_consumed_tokens_are_a_prefix_of_the_input() {
        let delete = noop().option("force", OptionDecl::bool());
        let loader = StaticLoader::new().module("users/[id]/delete", delete);
        let input = "users 123 delete --force";

        let mut consumed = Vec::new();
        let mut remaining = input.to_string();
        let mut dir = root();
        while !remaining.trim().is_empty() {
            let step = resolve_step(&remaining, &dir, &loader).unwrap();
            consumed.extend(step.command_tokens.clone());
            remaining = step.remaining_command_string.clone();
            dir = step.subcommands_dir.clone();
            if !step.has_continuation() {
                break;
            }
        }

        let input_tokens = tokens::split(input);
        assert_eq!(&input_tokens[..consumed.len()], consumed.as_slice());
    }
}
