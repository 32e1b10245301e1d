use super::exchange::SiteRecord;
use crate::core::models::atom::atomic_number;
use crate::core::models::region::EmbeddedRegion;
use crate::core::models::segment::PolarSegment;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobFileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid job file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Job {id}: {reason}")]
    InvalidJob { id: u64, reason: String },
    #[error("Duplicate job id: {0}")]
    DuplicateId(u64),
}

/// A job as read from a job file, before it is bound to an engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub id: u64,
    pub tag: String,
    pub region: EmbeddedRegion,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RawJobFile {
    #[serde(default, rename = "job")]
    jobs: Vec<RawJob>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct RawJob {
    id: u64,
    tag: String,
    qm_core: Vec<RawSegment>,
    #[serde(default)]
    near_field: Vec<RawSegment>,
    #[serde(default)]
    far_field: Vec<RawSegment>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RawSegment {
    id: usize,
    name: String,
    sites: Vec<SiteRecord>,
}

impl From<RawSegment> for PolarSegment {
    fn from(raw: RawSegment) -> Self {
        PolarSegment::new(
            raw.id,
            &raw.name,
            raw.sites.into_iter().map(Into::into).collect(),
        )
    }
}

/// Reader for the TOML job file listing the embedded regions to evaluate.
///
/// ```toml
/// [[job]]
/// id = 1
/// tag = "e_ct"
///
/// [[job.qm-core]]
/// id = 182
/// name = "C60"
/// sites = [{ element = "C", position = [0.0, 0.0, 0.0], charge = 0.0 }]
///
/// [[job.near-field]]
/// id = 392
/// name = "DCV"
/// sites = [{ element = "N", position = [6.0, 0.0, 0.0], charge = -0.2, dipole = [0.0, 0.1, 0.0] }]
/// ```
pub struct JobFile;

impl JobFile {
    /// Parses all jobs from a reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid TOML, if a job has an
    /// empty QM core, references an unknown element in its QM core, or if
    /// two jobs share an id.
    pub fn read_from(reader: &mut impl Read) -> Result<Vec<JobSpec>, JobFileError> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        Self::parse(&content)
    }

    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<JobSpec>, JobFileError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    pub fn parse(content: &str) -> Result<Vec<JobSpec>, JobFileError> {
        let raw: RawJobFile = toml::from_str(content)?;
        let mut seen = HashSet::new();
        let mut jobs = Vec::with_capacity(raw.jobs.len());

        for job in raw.jobs {
            if !seen.insert(job.id) {
                return Err(JobFileError::DuplicateId(job.id));
            }
            validate_job(&job)?;
            jobs.push(JobSpec {
                id: job.id,
                tag: job.tag,
                region: EmbeddedRegion::new(
                    job.qm_core.into_iter().map(Into::into).collect(),
                    job.near_field.into_iter().map(Into::into).collect(),
                    job.far_field.into_iter().map(Into::into).collect(),
                ),
            });
        }
        Ok(jobs)
    }
}

fn validate_job(job: &RawJob) -> Result<(), JobFileError> {
    let invalid = |reason: String| JobFileError::InvalidJob { id: job.id, reason };

    if job.tag.trim().is_empty() {
        return Err(invalid("tag must not be empty".to_string()));
    }
    if job.qm_core.iter().all(|seg| seg.sites.is_empty()) {
        return Err(invalid("QM core has no sites".to_string()));
    }
    for seg in &job.qm_core {
        if let Some(site) = seg.sites.iter().find(|s| atomic_number(&s.element).is_none()) {
            return Err(invalid(format!(
                "unknown element '{}' in QM core segment {} ({})",
                site.element, seg.id, seg.name
            )));
        }
    }
    Ok(())
}
