use super::{Fact, VersionSource};
use crate::model::VersionKind;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::process::Command;
use tracing::debug;

const PREVIOUS_SUFFIX: &str = "-previous";

/// Reads versions from local container images tagged `<app>-<environment>`
/// (current) or `<app>-<environment>-previous`.
pub struct DockerSource {
    environment: String,
    repository: Option<String>,
}

/// One local image and all tags pointing at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub id: String,
    pub tags: Vec<String>,
}

impl DockerSource {
    pub fn new(environment: impl Into<String>, repository: Option<String>) -> Self {
        Self {
            environment: environment.into(),
            repository,
        }
    }
}

impl VersionSource for DockerSource {
    fn name(&self) -> &'static str {
        "Docker Images"
    }

    fn facts(&self) -> Result<Vec<Fact>> {
        let mut args = vec!["images", "--format", "{{.ID}} {{.Tag}}"];
        if let Some(repository) = &self.repository {
            args.push(repository);
        }

        let listing = match docker(&args) {
            Ok(out) => out,
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                debug!("docker is not installed, skipping image scan");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let images = parse_image_list(&listing);
        Ok(image_facts(&images, &self.environment, inspect_image))
    }
}

fn docker(args: &[&str]) -> Result<String> {
    let output = Command::new("docker").args(args).output()?;

    if !output.status.success() {
        return Err(Error::Command(format!(
            "docker {} exited with {}: {}",
            args.first().copied().unwrap_or_default(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn inspect_image(id: &str) -> Option<(String, DateTime<Utc>)> {
    let format = r#"{{index .Config.Labels "version"}}||{{.Created}}"#;
    match docker(&["inspect", id, "--format", format]) {
        Ok(out) => parse_inspect_output(&out),
        Err(e) => {
            debug!("Failed to inspect image {}: {}", id, e);
            None
        }
    }
}

/// Groups `<id> <tag>` lines by image id, keeping first-seen order.
pub fn parse_image_list(output: &str) -> Vec<Image> {
    let mut images: Vec<Image> = Vec::new();

    for line in output.lines() {
        let mut parts = line.split_whitespace();
        let (id, tag) = match (parts.next(), parts.next()) {
            (Some(id), Some(tag)) => (id, tag),
            _ => continue,
        };

        match images.iter_mut().find(|image| image.id == id) {
            Some(image) => image.tags.push(tag.to_string()),
            None => images.push(Image {
                id: id.to_string(),
                tags: vec![tag.to_string()],
            }),
        }
    }

    images
}

/// Finds the application an image is deployed as in `environment`.
///
/// A `<app>-<environment>` tag takes precedence over a
/// `<app>-<environment>-previous` tag on the same image.
pub fn classify_tags(tags: &[String], environment: &str) -> Option<(String, VersionKind)> {
    let current_suffix = format!("-{}", environment);
    let previous_suffix = format!("-{}{}", environment, PREVIOUS_SUFFIX);

    let application_for = |suffix: &str| {
        tags.iter()
            .filter_map(|tag| tag.strip_suffix(suffix))
            .find(|application| !application.is_empty())
            .map(str::to_string)
    };

    application_for(&current_suffix)
        .map(|app| (app, VersionKind::Current))
        .or_else(|| application_for(&previous_suffix).map(|app| (app, VersionKind::Previous)))
}

/// Turns images into facts; `inspect` supplies the version label and
/// creation time for an image id. Images it cannot describe are skipped.
pub fn image_facts<F>(images: &[Image], environment: &str, inspect: F) -> Vec<Fact>
where
    F: Fn(&str) -> Option<(String, DateTime<Utc>)>,
{
    images
        .iter()
        .filter_map(|image| {
            let (application, kind) = classify_tags(&image.tags, environment)?;
            let (version, created_at) = inspect(&image.id)?;
            Some(Fact::new(application, kind, version, created_at))
        })
        .collect()
}

/// Parses `<version>||<created>` as printed by `docker inspect`.
pub fn parse_inspect_output(output: &str) -> Option<(String, DateTime<Utc>)> {
    let (version, created) = output.trim().split_once("||")?;
    let version = version.trim();
    if version.is_empty() || version == "<no value>" {
        return None;
    }

    let created_at = DateTime::parse_from_rfc3339(created.trim())
        .ok()?
        .with_timezone(&Utc);

    Some((version.to_string(), created_at))
}
