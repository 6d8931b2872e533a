//! Engine-wide constants: well-known attribute names, sigils and timing defaults.

/// Attribute holding an instruction's display name.
pub const NAME_ATTRIBUTE: &str = "name";

/// Attribute marking a top-level instruction as the procedure root.
pub const IS_ROOT_ATTRIBUTE: &str = "isRoot";

/// Accepted spellings for a truthy `isRoot` attribute.
pub const IS_ROOT_TRUE_VALUES: [&str; 5] = ["Yes", "True", "yes", "true", "1"];

/// Procedure attribute: seconds between scheduler ticks (0 means yield).
pub const TICK_TIMEOUT_ATTRIBUTE: &str = "tickTimeout";

/// Procedure attribute: granularity of halt-aware sleeps, in seconds.
pub const TIMING_ACCURACY_ATTRIBUTE: &str = "timingAccuracy";

/// Default granularity of halt-aware sleeps.
pub const TIMING_ACCURACY_SECONDS: f64 = 0.005;

/// Leading character of a late-bound placeholder attribute value.
pub const PLACEHOLDER_SIGIL: char = '$';

/// Leading character marking an attribute value as a workspace field reference.
pub const VARIABLE_SIGIL: char = '@';

/// Attribute names shared by several instructions.
pub const DESCRIPTION_ATTRIBUTE: &str = "description";
pub const TIMEOUT_ATTRIBUTE: &str = "timeout";
pub const VARIABLE_NAME_ATTRIBUTE: &str = "varName";
pub const INPUT_VARIABLE_ATTRIBUTE: &str = "inputVar";
pub const OUTPUT_VARIABLE_ATTRIBUTE: &str = "outputVar";
pub const FILENAME_ATTRIBUTE: &str = "file";
pub const PATH_ATTRIBUTE: &str = "path";

/// Timeouts are converted to nanoseconds; reject values outside this range.
/// More than 500 years, which should be enough.
pub const MAX_TIMEOUT_SECONDS: f64 = 18.4e9;
