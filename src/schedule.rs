use crate::model::{GroupKey, RequirementTree, Session, SessionRequirement, SubjectRequirement};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Sessions for one (year, group) cohort, indexed two ways: the full list in
/// start-time order, and a fine lookup by (lowercased location, date) with
/// candidates sorted by start time so first-match-wins is deterministic.
#[derive(Debug, Default)]
pub struct GroupSessions {
    pub all: Vec<Session>,
    by_site: HashMap<(String, NaiveDate), Vec<Session>>,
}

impl GroupSessions {
    pub fn candidates(&self, location: &str, date: NaiveDate) -> &[Session] {
        self.by_site
            .get(&(location.to_ascii_lowercase(), date))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Default)]
pub struct SessionIndex {
    groups: HashMap<GroupKey, GroupSessions>,
}

impl SessionIndex {
    pub fn build(sessions: &[Session]) -> Self {
        let mut groups: HashMap<GroupKey, GroupSessions> = HashMap::new();
        for s in sessions {
            let bucket = groups.entry(s.group_key()).or_default();
            bucket.all.push(s.clone());
            bucket
                .by_site
                .entry((s.location.to_ascii_lowercase(), s.date))
                .or_default()
                .push(s.clone());
        }
        for bucket in groups.values_mut() {
            bucket.all.sort_by_key(|s| s.start_datetime());
            for v in bucket.by_site.values_mut() {
                v.sort_by_key(|s| s.start_datetime());
            }
        }
        Self { groups }
    }

    pub fn group(&self, key: &GroupKey) -> Option<&GroupSessions> {
        self.groups.get(key)
    }
}

/// Raw count of scheduled rows per cohort. Used as "sessions completed so
/// far" by the status classifier, never as a requirement.
pub fn completed_sessions(sessions: &[Session]) -> BTreeMap<GroupKey, u32> {
    let mut out: BTreeMap<GroupKey, u32> = BTreeMap::new();
    for s in sessions {
        *out.entry(s.group_key()).or_insert(0) += 1;
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementMode {
    /// Each distinct scheduled (session, location) pair counts as exactly one
    /// required attendance.
    Literal,
    /// Required counts are rounded shares of `total_required_sessions`,
    /// apportioned by each subject's (then session's) share of the schedule.
    Proportional,
}

impl RequirementMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "literal" => Some(Self::Literal),
            "proportional" => Some(Self::Proportional),
            _ => None,
        }
    }
}

pub fn calculate_requirements(
    sessions: &[Session],
    total_required_sessions: u32,
    mode: RequirementMode,
) -> RequirementTree {
    match mode {
        RequirementMode::Literal => calculate_literal(sessions),
        RequirementMode::Proportional => calculate_proportional(sessions, total_required_sessions),
    }
}

fn calculate_literal(sessions: &[Session]) -> RequirementTree {
    // Distinct (session_number, location) pairs per subject; duplicates of a
    // pair in the schedule still count once.
    let mut seen: BTreeMap<GroupKey, BTreeMap<String, BTreeSet<(u32, String)>>> = BTreeMap::new();
    for s in sessions {
        seen.entry(s.group_key())
            .or_default()
            .entry(s.subject.clone())
            .or_default()
            .insert((s.session_number, s.location.clone()));
    }

    let mut tree: RequirementTree = BTreeMap::new();
    for (key, subjects) in seen {
        let entry = tree.entry(key).or_default();
        for (subject, pairs) in subjects {
            let mut req = SubjectRequirement::default();
            for (session_number, location) in pairs {
                req.total += 1;
                let sess = req.sessions.entry(session_number).or_default();
                sess.total += 1;
                *sess.locations.entry(location).or_insert(0) += 1;
            }
            entry.insert(subject, req);
        }
    }
    tree
}

fn calculate_proportional(sessions: &[Session], total_required_sessions: u32) -> RequirementTree {
    // Count schedule rows per subject/session/location first.
    struct Counts {
        total: u32,
        sessions: BTreeMap<u32, (u32, BTreeSet<String>)>,
    }
    let mut counts: BTreeMap<GroupKey, BTreeMap<String, Counts>> = BTreeMap::new();
    for s in sessions {
        let subj = counts
            .entry(s.group_key())
            .or_default()
            .entry(s.subject.clone())
            .or_insert_with(|| Counts {
                total: 0,
                sessions: BTreeMap::new(),
            });
        subj.total += 1;
        let sess = subj
            .sessions
            .entry(s.session_number)
            .or_insert_with(|| (0, BTreeSet::new()));
        sess.0 += 1;
        sess.1.insert(s.location.clone());
    }

    let mut tree: RequirementTree = BTreeMap::new();
    for (key, subjects) in counts {
        let group_total: u32 = subjects.values().map(|c| c.total).sum();
        if group_total == 0 {
            continue;
        }
        let entry = tree.entry(key).or_default();
        for (subject, c) in subjects {
            let share = c.total as f64 / group_total as f64;
            let required_subject = (share * total_required_sessions as f64).round() as u32;
            let mut req = SubjectRequirement {
                total: required_subject,
                sessions: BTreeMap::new(),
            };
            for (session_number, (session_count, locations)) in c.sessions {
                let session_share = session_count as f64 / c.total as f64;
                let required_session = (session_share * required_subject as f64).round() as u32;
                let mut sess = SessionRequirement {
                    total: required_session,
                    locations: BTreeMap::new(),
                };
                for location in locations {
                    sess.locations.insert(location, required_session);
                }
                req.sessions.insert(session_number, sess);
            }
            entry.insert(subject, req);
        }
    }
    tree
}
