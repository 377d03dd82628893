use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::assignment::booking_conflict;
use crate::domain::{Certification, Job, JobStatus, Role, TranslatorLevel, UserProfile};
use crate::store::{JobStore, PreferenceStore, StoreResult};

const ALL_LEVELS: &[TranslatorLevel] = &[
    TranslatorLevel::Certified,
    TranslatorLevel::CertifiedLaw,
    TranslatorLevel::CertifiedHealth,
    TranslatorLevel::Layman,
    TranslatorLevel::ReadsTranslationCourses,
];

/// Translator levels that satisfy a certification requirement.
pub fn levels_for(certification: Option<Certification>) -> &'static [TranslatorLevel] {
    match certification {
        Some(Certification::Yes | Certification::Both) => &[
            TranslatorLevel::Certified,
            TranslatorLevel::CertifiedLaw,
            TranslatorLevel::CertifiedHealth,
        ],
        Some(Certification::Law | Certification::NLaw) => &[TranslatorLevel::CertifiedLaw],
        Some(Certification::Health | Certification::NHealth) => {
            &[TranslatorLevel::CertifiedHealth]
        }
        Some(Certification::Normal) => &[
            TranslatorLevel::Layman,
            TranslatorLevel::ReadsTranslationCourses,
        ],
        None => ALL_LEVELS,
    }
}

fn same_town(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
        _ => false,
    }
}

/// Attribute filters for one translator against one job, without the
/// double-booking check which needs the store.
///
/// A physical-only job whose town differs from the translator's is never
/// matched; a phone fallback on the job lifts the town requirement.
pub fn is_eligible(job: &Job, translator: &UserProfile, blacklist: &HashSet<Uuid>) -> bool {
    if translator.role != Role::Translator || !translator.active {
        return false;
    }
    let prefs = &translator.preferences;

    let Some(job_type) = job.job_type else {
        return false;
    };
    match prefs.translator_type {
        Some(kind) if kind.job_type() == job_type => {}
        _ => return false,
    }

    if job.certification.is_some() {
        match prefs.level {
            Some(level) if levels_for(job.certification).contains(&level) => {}
            _ => return false,
        }
    }

    if let Some(gender) = job.gender {
        if prefs.gender != Some(gender) {
            return false;
        }
    }

    if !prefs.languages.contains(&job.from_language_id) {
        return false;
    }

    if blacklist.contains(&translator.id) {
        return false;
    }

    if job.physical_only() && !same_town(job.town.as_deref(), prefs.town.as_deref()) {
        return false;
    }

    true
}

/// Computes which translators may be offered a job.
#[derive(Clone)]
pub struct TranslatorMatcher {
    jobs: Arc<dyn JobStore>,
    preferences: Arc<dyn PreferenceStore>,
}

impl TranslatorMatcher {
    pub fn new(jobs: Arc<dyn JobStore>, preferences: Arc<dyn PreferenceStore>) -> Self {
        Self { jobs, preferences }
    }

    pub async fn find_candidates(&self, job: &Job) -> StoreResult<Vec<UserProfile>> {
        self.find_candidates_excluding(job, None).await
    }

    /// Candidates for `job`, leaving out `excluded` (a translator who just
    /// handed the job back).
    pub async fn find_candidates_excluding(
        &self,
        job: &Job,
        excluded: Option<Uuid>,
    ) -> StoreResult<Vec<UserProfile>> {
        let blacklist = self
            .preferences
            .blacklisted_translators(job.requester_id)
            .await?;

        let mut candidates = Vec::new();
        for translator in self.preferences.translators().await? {
            if Some(translator.id) == excluded || !is_eligible(job, &translator, &blacklist) {
                continue;
            }
            if self.is_double_booked(translator.id, job).await? {
                continue;
            }
            candidates.push(translator);
        }

        debug!(job_id = %job.id, candidates = candidates.len(), "matched translators");
        Ok(candidates)
    }

    /// Pending jobs this translator could accept right now.
    pub async fn potential_jobs(&self, translator: &UserProfile) -> StoreResult<Vec<Job>> {
        let pending = self.jobs.jobs_with_status(JobStatus::Pending).await?;
        let open = self.jobs.open_jobs_for_translator(translator.id).await?;

        let mut blacklists: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
        let mut matches = Vec::new();
        for job in pending {
            if !blacklists.contains_key(&job.requester_id) {
                let blacklist = self
                    .preferences
                    .blacklisted_translators(job.requester_id)
                    .await?;
                blacklists.insert(job.requester_id, blacklist);
            }
            let blacklist = &blacklists[&job.requester_id];
            if is_eligible(&job, translator, blacklist) && !booking_conflict(open.iter(), &job) {
                matches.push(job);
            }
        }
        Ok(matches)
    }

    async fn is_double_booked(&self, translator_id: Uuid, job: &Job) -> StoreResult<bool> {
        let open = self.jobs.open_jobs_for_translator(translator_id).await?;
        Ok(booking_conflict(open.iter(), job))
    }
}
