//! Retention: choosing which restore points to evict and cleaning their storages.
//!
//! Every policy evicts a run of the oldest restore points and always leaves at
//! least the newest one alive. The oldest survivor is the *boundary*; cleaning
//! compares each victim against it so storages whose content the boundary
//! still covers stay on disk.

pub mod cleaning;
pub mod logger;

use crate::backup::repository::ExtendedRepository;
use crate::backup::restore_point::{RestorePoint, RetainedStorage};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::retention::cleaning::CleaningAlgorithm;
use crate::backup::retention::logger::RetentionLogger;
use chrono::{DateTime, TimeDelta, Utc};
use getset::Getters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::debug;
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HybridMode {
    /// Evict a point only when every policy would.
    #[default]
    All,
    /// Evict a point as soon as one policy would.
    Any,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy")]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum RetentionPolicy {
    /// Keep the `limit` newest restore points.
    ByCount { limit: usize },
    /// Keep the newest restore points whose storages fit in `max_bytes`.
    BySize { max_bytes: u64 },
    /// Keep restore points younger than `max_age`.
    ByAge {
        #[serde(with = "humantime_serde")]
        max_age: Duration,
    },
    Hybrid {
        #[serde(default)]
        mode: HybridMode,
        policies: Vec<RetentionPolicy>,
    },
}

fn invalid(code: &'static str, msg: String) -> ValidationError {
    ValidationError::new(code).with_message(msg.into())
}

impl Validate for RetentionPolicy {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        match self {
            RetentionPolicy::ByCount { limit } if *limit == 0 => errors.add(
                "limit",
                invalid("InvalidLimit", "cannot keep at most 0 restore points".into()),
            ),
            RetentionPolicy::BySize { max_bytes } if *max_bytes == 0 => errors.add(
                "max_bytes",
                invalid("InvalidLimit", "size limit must be positive".into()),
            ),
            RetentionPolicy::ByAge { max_age } if max_age.is_zero() => errors.add(
                "max_age",
                invalid("InvalidLimit", "age limit must be positive".into()),
            ),
            RetentionPolicy::Hybrid { policies, .. } => {
                if policies.is_empty() {
                    errors.add(
                        "policies",
                        invalid("EmptyHybrid", "hybrid policy needs at least one policy".into()),
                    );
                }
                for e in policies.iter().filter_map(|p| p.validate().err()) {
                    errors.add("policies", invalid("InvalidPolicy", e.to_string()));
                }
            }
            _ => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Display for RetentionPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RetentionPolicy::ByCount { limit } => write!(f, "count limit {limit}"),
            RetentionPolicy::BySize { max_bytes } => write!(f, "size limit {max_bytes} bytes"),
            RetentionPolicy::ByAge { max_age } => write!(f, "age limit {:?}", max_age),
            RetentionPolicy::Hybrid { mode, policies } => {
                let sep = match mode {
                    HybridMode::All => " and ",
                    HybridMode::Any => " or ",
                };
                write!(f, "({})", policies.iter().join(sep))
            }
        }
    }
}

impl RetentionPolicy {
    /// Number of leading points of `sorted` (oldest first) this policy evicts.
    fn evict_count<R: ExtendedRepository + ?Sized>(
        &self,
        sorted: &[RestorePoint],
        repository: &R,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let count = match self {
            RetentionPolicy::ByCount { limit } => sorted.len().saturating_sub(*limit),
            RetentionPolicy::BySize { max_bytes } => {
                let sizes: Vec<u64> = sorted
                    .iter()
                    .map(|rp| {
                        rp.storages()
                            .iter()
                            .map(|s| repository.storage_size(s.name()))
                            .sum::<Result<u64>>()
                    })
                    .collect::<Result<_>>()?;
                let mut total: u64 = sizes.iter().sum();
                let mut count = 0;
                while total > *max_bytes && count < sizes.len() {
                    total -= sizes[count];
                    count += 1;
                }
                count
            }
            RetentionPolicy::ByAge { max_age } => {
                let max_age = TimeDelta::from_std(*max_age).unwrap_or(TimeDelta::MAX);
                match now.checked_sub_signed(max_age) {
                    Some(cutoff) => sorted
                        .iter()
                        .take_while(|rp| *rp.created_at() < cutoff)
                        .count(),
                    None => 0,
                }
            }
            RetentionPolicy::Hybrid { mode, policies } => {
                let counts: Vec<usize> = policies
                    .iter()
                    .map(|p| p.evict_count(sorted, repository, now))
                    .collect::<Result<_>>()?;
                match mode {
                    HybridMode::All => counts.into_iter().min().unwrap_or(0),
                    HybridMode::Any => counts.into_iter().max().unwrap_or(0),
                }
            }
        };
        Ok(count)
    }
}

/// Restore points chosen for eviction.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Eviction {
    /// Newest first.
    victims: Vec<RestorePoint>,
    /// Oldest restore point that survives.
    boundary: RestorePoint,
}

impl Eviction {
    pub fn into_victims(self) -> Vec<RestorePoint> {
        self.victims
    }
}

/// A retention policy paired with the cleaning algorithm applied to its victims.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct RetentionController {
    policy: RetentionPolicy,
    cleaning: CleaningAlgorithm,
}

impl RetentionController {
    pub fn new(policy: RetentionPolicy, cleaning: CleaningAlgorithm) -> Result<Self> {
        policy
            .validate()
            .map_err(|e| Error::validation(format!("invalid retention policy {policy}: {e}")))?;
        Ok(Self { policy, cleaning })
    }

    pub fn by_count(limit: usize, cleaning: CleaningAlgorithm) -> Result<Self> {
        Self::new(RetentionPolicy::ByCount { limit }, cleaning)
    }

    pub fn by_size(max_bytes: u64, cleaning: CleaningAlgorithm) -> Result<Self> {
        Self::new(RetentionPolicy::BySize { max_bytes }, cleaning)
    }

    pub fn by_age(max_age: Duration, cleaning: CleaningAlgorithm) -> Result<Self> {
        Self::new(RetentionPolicy::ByAge { max_age }, cleaning)
    }

    /// Picks the points to evict without touching anything. `None` when the
    /// policy is already satisfied.
    pub fn select<R: ExtendedRepository + ?Sized>(
        &self,
        restore_points: &[RestorePoint],
        repository: &R,
        now: DateTime<Utc>,
    ) -> Result<Option<Eviction>> {
        let sorted = restore_points
            .iter()
            .sorted_by_key(|rp| *rp.created_at())
            .cloned()
            .collect_vec();

        let count = self
            .policy
            .evict_count(&sorted, repository, now)?
            .min(sorted.len().saturating_sub(1));
        if count == 0 {
            debug!("{} restore point(s) satisfy {}", sorted.len(), self.policy);
            return Ok(None);
        }

        let boundary = sorted[count].clone();
        let victims = sorted.into_iter().take(count).rev().collect_vec();
        Ok(Some(Eviction { victims, boundary }))
    }

    /// Runs the cleaning algorithm over every victim, newest first, and
    /// reports the result to `logger`. Returns the storages left on disk, each
    /// covered by the boundary.
    pub fn clean<R: ExtendedRepository + ?Sized>(
        &self,
        eviction: &Eviction,
        repository: &mut R,
        logger: &dyn RetentionLogger,
    ) -> Result<Vec<RetainedStorage>> {
        let mut lines = Vec::with_capacity(eviction.victims.len());
        let mut retained = Vec::new();
        for victim in &eviction.victims {
            let deleted = self
                .cleaning
                .clean_restore_point(victim, &eviction.boundary, repository)
                .with_msg(format!("Retention under {} stopped", self.policy))?;
            retained.extend(
                victim
                    .storages()
                    .iter()
                    .filter(|s| !deleted.contains(s.name()))
                    .map(|s| RetainedStorage::new(s.clone(), *eviction.boundary.id())),
            );
            lines.push(format!("\t{}", victim.info()));
        }

        logger.log_message(&format!(
            "Cleaned {} restore points by {} under {}, {} storage(s) kept:\n{}",
            eviction.victims.len(),
            self.cleaning,
            self.policy,
            retained.len(),
            lines.join("\n")
        ));
        Ok(retained)
    }

    /// Selects and cleans in one go, returning the evicted points newest first.
    /// Storages kept by the cleaning are not reported; jobs use
    /// [`select`](Self::select) and [`clean`](Self::clean) to track them.
    pub fn control_restore_points<R: ExtendedRepository + ?Sized>(
        &self,
        restore_points: &[RestorePoint],
        repository: &mut R,
        logger: &dyn RetentionLogger,
    ) -> Result<Option<Vec<RestorePoint>>> {
        self.control_restore_points_at(restore_points, repository, logger, Utc::now())
    }

    pub fn control_restore_points_at<R: ExtendedRepository + ?Sized>(
        &self,
        restore_points: &[RestorePoint],
        repository: &mut R,
        logger: &dyn RetentionLogger,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<RestorePoint>>> {
        let Some(eviction) = self.select(restore_points, repository, now)? else {
            return Ok(None);
        };
        self.clean(&eviction, repository, logger)?;
        Ok(Some(eviction.into_victims()))
    }
}
