use std::io;
use std::path::PathBuf;

/// A convenience [`Result`] for the tilery crate.
pub type TileryResult<T> = Result<T, TileryError>;

#[derive(thiserror::Error, Debug)]
pub enum TileryError {
    #[error(transparent)]
    TileError(#[from] crate::tile::TileError),

    #[error(transparent)]
    CacheError(#[from] crate::cache::CacheError),

    #[error(transparent)]
    MvtError(#[from] crate::mvt::MvtError),

    #[error(transparent)]
    EsError(#[from] crate::es::EsError),

    #[error(transparent)]
    PgError(#[from] crate::pg::PgError),

    #[error(transparent)]
    ConfigError(#[from] ConfigError),

    #[error("Invalid tile {0} '{1}'")]
    BadTileAddress(String, String),

    #[error("Unable to bind to {1}: {0}")]
    BindingError(#[source] io::Error, String),

    #[error(transparent)]
    IoError(#[from] io::Error),
}

/// Startup-time configuration failures. These abort the process.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Unable to load config file {1}: {0}")]
    ConfigLoadError(#[source] io::Error, PathBuf),

    #[error("Unable to parse config file {1}: {0}")]
    ConfigParseError(#[source] subst::yaml::Error, PathBuf),

    #[error("Layer [{0}] must configure exactly one backend source")]
    AmbiguousSource(String),

    #[error("Layer [{0}] has no backend source configured")]
    NoSource(String),

    #[error("Layer [{0}] has minzoom {1} above maxzoom {2}")]
    InvertedZoomRange(String, u8, u8),

    #[error("Duplicate layer name [{0}]")]
    DuplicateLayer(String),
}
