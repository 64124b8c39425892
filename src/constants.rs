//! Compile-time constants and tunables shared across the crate.

/// Application name used for the config directory and file name.
pub const APP_NAME: &str = "autocodex";
/// Application version injected from `Cargo.toml` at compile time.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "AUTOCODEX_CONFIG";
/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "autocodex.toml";

// ── IRC defaults ─────────────────────────────────────────────────────

pub const DEFAULT_SERVER: &str = "irc.quakenet.org";
pub const DEFAULT_PORT: u16 = 6667;
pub const DEFAULT_CHANNEL: &str = "#c++";
pub const DEFAULT_NICKNAME: &str = "autocodex";
pub const DEFAULT_USERNAME: &str = "autocodex";
pub const DEFAULT_REALNAME: &str = "Pero Tulkkinen";

/// Longest inbound line we buffer. Anything past it, up to the next
/// newline, is discarded.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// Fallback nicks are kept within QuakeNet's nick length limit.
pub const FALLBACK_NICK_MAX_LEN: usize = 15;
/// Collisions tolerated during registration before giving up on the
/// connection.
pub const MAX_NICK_FALLBACKS: usize = 8;

// ── Autonomous emission ──────────────────────────────────────────────

/// Shortest wait between autonomous messages (8 hours).
pub const DEFAULT_MIN_TIME_SECS: u64 = 8 * 3600;
/// Longest wait between autonomous messages (24 hours).
pub const DEFAULT_MAX_TIME_SECS: u64 = 24 * 3600;

// ── Generator subprocess ─────────────────────────────────────────────

pub const DEFAULT_GENERATOR: &str = "./generator";
pub const DEFAULT_CORPUS: &str = "filtered.txt";
/// Flag that introduces the corpus file argument.
pub const CORPUS_FLAG: &str = "-f";
/// Flag that introduces the query (include-word) argument.
pub const QUERY_FLAG: &str = "-w";
/// Deadline for a single generator run.
pub const DEFAULT_GENERATOR_TIMEOUT_SECS: u64 = 120;
/// How many generator processes may run at the same time.
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

// ── Supervision & reconnect ──────────────────────────────────────────

/// How often the nickname is checked against the configured one.
pub const DEFAULT_REGAIN_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_INITIAL_BACKOFF_SECS: u64 = 5;
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 300;
/// The server must welcome us within this long after connecting.
pub const DEFAULT_REGISTRATION_TIMEOUT_SECS: u64 = 60;
/// Silence on the connection before we PING the server.
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 120;
/// Grace period for any reply to that PING.
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 60;

// ── Corpus filter ────────────────────────────────────────────────────

/// Speaker whose lines make up the corpus.
pub const DEFAULT_SPEAKER_PATTERN: &str = r"(?i)^codex(_*|\d)$";
/// Messages matching any of these are dropped (bot invocations, links).
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[r"^(<<|\{)", r"https?:"];
/// Messages with fewer space-separated tokens than this are dropped.
pub const DEFAULT_MIN_TOKENS: usize = 4;
