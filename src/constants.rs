pub const DEFAULT_DB: &str = "mensa-archive.sqlite";
pub const DEFAULT_CONFIG: &str = "mensa-archive.toml";

pub const DEFAULT_FUZZY_MIN_RATIO: u8 = 80;
pub const DEFAULT_MIN_REPORTS: u32 = 3;
pub const DEFAULT_RATING_DAILY_LIMIT: u32 = 3;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_MAX_PARALLEL_FETCHES: usize = 4;

pub const USER_AGENT: &str = concat!("mensa-archive-rs/", env!("CARGO_PKG_VERSION"));

// day codes understood by the legacy speiseplan pages
pub const LEGACY_DAY_TODAY: u32 = 0;
pub const LEGACY_DAY_NEXT: u32 = 99;

pub const NOTIFICATION_SUBJECT_PREFIX: &str = "Mensabenachrichtigung";
