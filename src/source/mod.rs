//! Version discovery sources.
//!
//! A [`VersionSource`] looks at something on the local host and reports
//! [`Fact`]s about deployed applications. The [`Registry`] runs every
//! registered source in turn; sources never coordinate with each other,
//! conflicting facts are resolved by timestamp in [`Application`].
//!
//! | Source | Looks at |
//! |--------|----------|
//! | [`ReleaseDirectorySource`] | `<root>/<app>/current` and `previous` symlinks |
//! | [`DockerSource`] | local container images tagged `<app>-<environment>` |
//!
//! [`Application`]: crate::model::Application

mod docker;
mod release_directory;

pub use docker::{classify_tags, image_facts, parse_image_list, parse_inspect_output, DockerSource, Image};
pub use release_directory::{scan_release_directory, ReleaseDirectorySource};

use crate::config::Config;
use crate::model::VersionKind;
use crate::registry::Registry;
use crate::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// A single observation made by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub application: String,
    pub kind: VersionKind,
    pub version: String,
    pub created_at: DateTime<Utc>,
}

impl Fact {
    pub fn new(
        application: impl Into<String>,
        kind: VersionKind,
        version: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            application: application.into(),
            kind,
            version: version.into(),
            created_at,
        }
    }
}

/// Trait for discovering deployed versions on the local host.
///
/// Implementors only need [`facts`](Self::facts); the provided
/// [`discover`](Self::discover) feeds them into a registry. Failures for a
/// single unit (one symlink, one image) are skipped inside `facts`. An error
/// returned from `facts` means the whole source could not run and is logged,
/// never propagated.
pub trait VersionSource {
    /// Returns the human-readable name of this source.
    fn name(&self) -> &'static str;

    /// Collects every fact this source can currently observe.
    fn facts(&self) -> Result<Vec<Fact>>;

    /// Adds this source's facts to `registry`.
    fn discover(&self, registry: &mut Registry) {
        let facts = match self.facts() {
            Ok(facts) => facts,
            Err(e) => {
                warn!(source = self.name(), "Version source failed: {}", e);
                return;
            }
        };

        debug!(source = self.name(), count = facts.len(), "Discovered facts");

        for fact in facts {
            registry
                .application(&fact.application)
                .add_record(fact.kind, fact.version, fact.created_at);
        }
    }
}

/// Builds the sources enabled in `config`, in registration order.
pub fn configured_sources(config: &Config) -> Vec<Box<dyn VersionSource>> {
    let mut sources: Vec<Box<dyn VersionSource>> = Vec::new();

    if config.release_directory.enabled {
        sources.push(Box::new(ReleaseDirectorySource::new(
            &config.release_directory.root,
        )));
    }

    if config.docker.enabled {
        sources.push(Box::new(DockerSource::new(
            &config.environment_name,
            config.docker.repository.clone(),
        )));
    }

    sources
}
