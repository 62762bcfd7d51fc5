use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl ArchiveError {
    /// Errors after which no further reconciliation is safe for the whole run.
    pub fn is_fatal(&self) -> bool {
        match self {
            ArchiveError::Storage(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::DiskFull
                    | ErrorCode::NotADatabase
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::ReadOnly
            ),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum UserActionError {
    #[error("Du hast dieses Gericht bereits als veraltet gemeldet.")]
    AlreadyReported,
    #[error("Du hast dieses Gericht bereits bestätigt.")]
    AlreadyVerified,
    #[error("Du hast dieses Gericht heute bereits bewertet.")]
    AlreadyRated,
    #[error("Du hast heute bereits die mögliche Anzahl an Gerichten bewertet.")]
    RatingLimitReached,
    #[error("Bewertungen müssen zwischen 1 und 5 liegen, nicht {0}.")]
    InvalidRating(u8),
    #[error("Dieses Gericht ist für den Tag bereits eingetragen.")]
    AlreadyListed(i64),
    #[error("Gericht {0} existiert nicht.")]
    ServingNotFound(i64),
    #[error("Mensa {0} existiert nicht.")]
    CanteenNotFound(i64),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl From<rusqlite::Error> for UserActionError {
    fn from(e: rusqlite::Error) -> Self {
        UserActionError::Archive(e.into())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OpeningTimeError {
    #[error("unknown weekday '{0}'")]
    UnknownWeekday(String),
    #[error("Zeit konnte nicht gelesen werden: '{0}'")]
    InvalidTime(String),
    #[error("range ends before it starts ({first}-{last})")]
    ReversedRange { first: u32, last: u32 },
}
