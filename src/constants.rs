// src/constants.rs

/// The directory name tried by the default command-root lookup.
pub const DEFAULT_COMMANDS_DIR: &str = "commands";

/// Canonical key of the option contributed by the built-in help plugin.
pub const HELP_OPTION: &str = "help";

/// Short alias of the help option.
pub const HELP_ALIAS: &str = "h";

/// Pattern a literal command name must match before it is looked up.
/// Tokens that fail this pattern can still be captured by route parameters.
pub const COMMAND_NAME_PATTERN: &str = "^[A-Za-z0-9_]+$";

/// Opening marker of a rest route-parameter segment, e.g. `[...files]`.
pub const REST_PARAM_OPEN: &str = "[...";

/// Opening marker of a single-token route-parameter segment, e.g. `[id]`.
pub const PARAM_OPEN: &str = "[";

/// Closing marker of a route-parameter segment.
pub const PARAM_CLOSE: &str = "]";

/// Default token delimiter for splitting and joining command strings.
pub const DEFAULT_DELIMITER: char = ' ';

/// Token that ends option parsing; everything after it is positional.
pub const OPTION_TERMINATOR: &str = "--";

/// Log target used by the engine and the built-in logger plugin.
pub const LOG_TARGET: &str = "tiller";
