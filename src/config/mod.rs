//! Layered JSON configuration.
//!
//! An application's configuration is split over four files:
//!
//! | Layer        | Location                              |
//! |--------------|---------------------------------------|
//! | project-user | `<project>/<app>.config.user.json`    |
//! | project      | `<project>/<app>.config.json`         |
//! | global-user  | `<home>/<app>.config.user.json`       |
//! | global       | `<home>/<app>.config.json`            |
//!
//! Earlier rows win on read. Writes go to one active layer.
//!
//! ## Security
//!
//! Paths listed under `secure` never reach the file on disk. Their values are
//! moved to a [`SecureVault`](crate::vault::SecureVault) on save and spliced
//! back on load.
//!
//! Use the [`resolver`] module to find where a profile property came from and
//! to write it back.

pub mod layer;
pub mod locator;
pub mod manager;
pub mod path;
pub mod resolver;
pub mod schema;

pub use layer::ConfigLayer;
pub use locator::{LayerLocator, LayerPaths, env_prefix};
pub use manager::{Config, LoadOptions, SetOptions};
pub use resolver::{ProfLoc, ProfLocType, ResolvedProperty, env_var_name};
pub use schema::{ConfigProperties, ProfileNode, SECURE_VALUE_MASK};
