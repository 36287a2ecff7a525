//! Skill matching
//!
//! Pure functions that pair users by what they can teach each other. Skills
//! and languages are compared after normalization (comma split, trim,
//! lower-case). Skills match fuzzily, languages exactly.
//!
//! Nothing here touches storage; callers load the user table and hand it in.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::models::{User, UserSummary};

/// Default acceptance threshold for [`partial_ratio`]
pub const DEFAULT_THRESHOLD: u8 = 80;

/// Normalized skill set from a comma-joined skill string
pub fn skill_keywords(skills: &str) -> BTreeSet<String> {
    split_normalized(skills)
}

/// Normalized language set from a comma-joined language string
pub fn parse_languages(languages: &str) -> BTreeSet<String> {
    split_normalized(languages)
}

fn split_normalized(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Best similarity (0..=100) between the shorter string and the windows of
/// the longer one that line up with their common blocks.
///
/// Each window is as long as the shorter string, truncated at the end of the
/// longer one, and scores the Ratcliff/Obershelp ratio `2 * M / (len_a + len_b)`
/// where `M` counts the characters in the recursively found longest common
/// blocks. Comparison is case-insensitive; an empty side scores 0. With equal
/// lengths the first argument is the one aligned, so the score is not
/// symmetric in that case.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().flat_map(char::to_lowercase).collect();
    let b: Vec<char> = b.chars().flat_map(char::to_lowercase).collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    if a == b {
        return 100;
    }

    let (short, long) = if a.len() <= b.len() { (&a[..], &b[..]) } else { (&b[..], &a[..]) };

    let mut best = 0.0_f64;
    for block in BlockMatcher::new(short, long).matching_blocks() {
        let start = block.b.saturating_sub(block.a);
        let end = (start + short.len()).min(long.len());
        let ratio = BlockMatcher::new(short, &long[start..end]).ratio();
        if ratio > 0.995 {
            return 100;
        }
        best = best.max(ratio);
    }

    (best * 100.0).round_ties_even() as u8
}

/// Higher of the two [`partial_ratio`] orientations
pub fn skill_similarity(a: &str, b: &str) -> u8 {
    partial_ratio(a, b).max(partial_ratio(b, a))
}

/// `a[a..a + size] == b[b..b + size]`
#[derive(Debug, Clone, Copy)]
struct Block {
    a: usize,
    b: usize,
    size: usize,
}

/// Ratcliff/Obershelp block matching of `a` against `b`.
///
/// Characters making up more than 1% of a `b` of 200 or more characters are
/// treated as popular and never start a block.
struct BlockMatcher<'s> {
    a: &'s [char],
    b: &'s [char],
    b2j: HashMap<char, Vec<usize>>,
}

impl<'s> BlockMatcher<'s> {
    fn new(a: &'s [char], b: &'s [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, &c) in b.iter().enumerate() {
            b2j.entry(c).or_default().push(j);
        }
        if b.len() >= 200 {
            let popular = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= popular);
        }
        Self { a, b, b2j }
    }

    /// Longest common block within the given ranges; ties go to the earliest
    /// start in `a`, then in `b`.
    fn longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Block {
        let (mut best_a, mut best_b, mut best_size) = (alo, blo, 0);
        let mut run_len: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| run_len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next.insert(j, k);
                    if k > best_size {
                        best_a = i + 1 - k;
                        best_b = j + 1 - k;
                        best_size = k;
                    }
                }
            }
            run_len = next;
        }

        // Popular characters can still extend a block they did not start.
        while best_a > alo && best_b > blo && self.a[best_a - 1] == self.b[best_b - 1] {
            best_a -= 1;
            best_b -= 1;
            best_size += 1;
        }
        while best_a + best_size < ahi
            && best_b + best_size < bhi
            && self.a[best_a + best_size] == self.b[best_b + best_size]
        {
            best_size += 1;
        }

        Block {
            a: best_a,
            b: best_b,
            size: best_size,
        }
    }

    /// Non-overlapping common blocks in order, ending with a zero-sized block
    /// at `(a.len(), b.len())`
    fn matching_blocks(&self) -> Vec<Block> {
        let mut pending = vec![(0, self.a.len(), 0, self.b.len())];
        let mut blocks = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let block = self.longest_match(alo, ahi, blo, bhi);
            if block.size == 0 {
                continue;
            }
            if alo < block.a && blo < block.b {
                pending.push((alo, block.a, blo, block.b));
            }
            if block.a + block.size < ahi && block.b + block.size < bhi {
                pending.push((block.a + block.size, ahi, block.b + block.size, bhi));
            }
            blocks.push(block);
        }

        blocks.sort_by_key(|block| (block.a, block.b));
        blocks.push(Block {
            a: self.a.len(),
            b: self.b.len(),
            size: 0,
        });
        blocks
    }

    fn ratio(&self) -> f64 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 1.0;
        }
        let matched: usize = self.matching_blocks().iter().map(|block| block.size).sum();
        2.0 * matched as f64 / total as f64
    }
}

/// The `have` skills that fuzzily match at least one `want` skill, in either
/// orientation
pub fn fuzzy_skill_match(
    have: &BTreeSet<String>,
    want: &BTreeSet<String>,
    threshold: u8,
) -> BTreeSet<String> {
    have.iter()
        .filter(|h| want.iter().any(|w| skill_similarity(h, w) >= threshold))
        .cloned()
        .collect()
}

/// Languages both users speak
pub fn common_languages(a: &User, b: &User) -> BTreeSet<String> {
    let a_langs = parse_languages(&a.preferred_language);
    let b_langs = parse_languages(&b.preferred_language);
    a_langs.intersection(&b_langs).cloned().collect()
}

/// Two users who can each teach the other
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutualMatch {
    pub user_a: UserSummary,
    pub user_b: UserSummary,
    pub a_teaches: BTreeSet<String>,
    pub b_teaches: BTreeSet<String>,
    pub languages: BTreeSet<String>,
    pub both_online: bool,
}

/// A teacher and a student sharing a language
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OneWayMatch {
    pub teacher: UserSummary,
    pub student: UserSummary,
    pub skills: BTreeSet<String>,
    pub languages: BTreeSet<String>,
    pub both_online: bool,
}

/// A directed "can teach" relation between two users
pub type TeachingPair = OneWayMatch;

/// All pairwise matches over a user list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub mutual: Vec<MutualMatch>,
    pub one_way: Vec<OneWayMatch>,
}

/// Someone a given user can teach or learn from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchPartner {
    pub user: UserSummary,
    pub skills: BTreeSet<String>,
    pub languages: BTreeSet<String>,
    pub is_online: bool,
}

/// Matches seen from one user's side
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserMatches {
    pub user: UserSummary,
    pub can_teach: Vec<MatchPartner>,
    pub can_learn_from: Vec<MatchPartner>,
}

/// Headline numbers for the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub total_users: usize,
    pub active_users: usize,
    /// Mutual matches where both users are online
    pub live_matches: usize,
    /// Live mutual plus live one-way matches
    pub total_opportunities: usize,
}

impl MatchStats {
    pub fn compute(users: &[User], report: &MatchReport) -> Self {
        let live_matches = report.mutual.iter().filter(|m| m.both_online).count();
        let live_one_way = report.one_way.iter().filter(|m| m.both_online).count();
        Self {
            total_users: users.len(),
            active_users: users.iter().filter(|u| u.is_online).count(),
            live_matches,
            total_opportunities: live_matches + live_one_way,
        }
    }
}

struct PairOverlap {
    a_teaches: BTreeSet<String>,
    b_teaches: BTreeSet<String>,
    languages: BTreeSet<String>,
}

/// Fuzzy matcher with a fixed acceptance threshold
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    threshold: u8,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Matcher {
    /// Thresholds above 100 are clamped.
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold: threshold.min(100),
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Skills `a` has that `b` wants
    pub fn can_teach(&self, a: &User, b: &User) -> BTreeSet<String> {
        fuzzy_skill_match(
            &skill_keywords(&a.skills_have),
            &skill_keywords(&b.skills_want),
            self.threshold,
        )
    }

    fn overlap(&self, a: &User, b: &User) -> PairOverlap {
        PairOverlap {
            a_teaches: self.can_teach(a, b),
            b_teaches: self.can_teach(b, a),
            languages: common_languages(a, b),
        }
    }

    /// Both directions teach and a language is shared
    pub fn mutual_match(&self, a: &User, b: &User) -> Option<MutualMatch> {
        if a.id == b.id {
            return None;
        }
        mutual_from(a, b, self.overlap(a, b))
    }

    /// Exactly one direction teaches and a language is shared
    pub fn one_way_match(&self, a: &User, b: &User) -> Option<OneWayMatch> {
        if a.id == b.id {
            return None;
        }
        one_way_from(a, b, self.overlap(a, b))
    }

    /// Scan each unordered pair once, in list order
    pub fn find_matches(&self, users: &[User]) -> MatchReport {
        let mut report = MatchReport::default();

        for (i, a) in users.iter().enumerate() {
            for b in &users[i + 1..] {
                if a.id == b.id {
                    continue;
                }
                let overlap = self.overlap(a, b);
                if overlap.languages.is_empty() {
                    continue;
                }
                if !overlap.a_teaches.is_empty() && !overlap.b_teaches.is_empty() {
                    report.mutual.extend(mutual_from(a, b, overlap));
                } else {
                    report.one_way.extend(one_way_from(a, b, overlap));
                }
            }
        }

        report
    }

    /// Every ordered pair where the first user can teach the second
    pub fn teaching_pairs(&self, users: &[User]) -> Vec<TeachingPair> {
        let mut pairs = Vec::new();
        for teacher in users {
            for student in users {
                if teacher.id == student.id {
                    continue;
                }
                let languages = common_languages(teacher, student);
                if languages.is_empty() {
                    continue;
                }
                let skills = self.can_teach(teacher, student);
                if skills.is_empty() {
                    continue;
                }
                pairs.push(TeachingPair {
                    teacher: UserSummary::from(teacher),
                    student: UserSummary::from(student),
                    skills,
                    languages,
                    both_online: teacher.is_online && student.is_online,
                });
            }
        }
        pairs
    }

    /// Who `user_id` can teach and learn from. `None` if the user is not in
    /// the list.
    pub fn matches_for_user(&self, users: &[User], user_id: i64) -> Option<UserMatches> {
        let target = users.iter().find(|u| u.id == user_id)?;
        let mut matches = UserMatches {
            user: UserSummary::from(target),
            can_teach: Vec::new(),
            can_learn_from: Vec::new(),
        };

        for other in users.iter().filter(|u| u.id != user_id) {
            let overlap = self.overlap(target, other);
            if overlap.languages.is_empty() {
                continue;
            }
            if !overlap.a_teaches.is_empty() {
                matches.can_teach.push(MatchPartner {
                    user: UserSummary::from(other),
                    skills: overlap.a_teaches,
                    languages: overlap.languages.clone(),
                    is_online: other.is_online,
                });
            }
            if !overlap.b_teaches.is_empty() {
                matches.can_learn_from.push(MatchPartner {
                    user: UserSummary::from(other),
                    skills: overlap.b_teaches,
                    languages: overlap.languages,
                    is_online: other.is_online,
                });
            }
        }

        Some(matches)
    }
}

fn mutual_from(a: &User, b: &User, overlap: PairOverlap) -> Option<MutualMatch> {
    if overlap.languages.is_empty() || overlap.a_teaches.is_empty() || overlap.b_teaches.is_empty()
    {
        return None;
    }
    Some(MutualMatch {
        user_a: UserSummary::from(a),
        user_b: UserSummary::from(b),
        a_teaches: overlap.a_teaches,
        b_teaches: overlap.b_teaches,
        languages: overlap.languages,
        both_online: a.is_online && b.is_online,
    })
}

fn one_way_from(a: &User, b: &User, overlap: PairOverlap) -> Option<OneWayMatch> {
    if overlap.languages.is_empty() {
        return None;
    }
    let (teacher, student, skills) = match (overlap.a_teaches.is_empty(), overlap.b_teaches.is_empty()) {
        (false, true) => (a, b, overlap.a_teaches),
        (true, false) => (b, a, overlap.b_teaches),
        _ => return None,
    };
    Some(OneWayMatch {
        teacher: UserSummary::from(teacher),
        student: UserSummary::from(student),
        skills,
        languages: overlap.languages,
        both_online: a.is_online && b.is_online,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, have: &str, want: &str, languages: &str) -> User {
        let mut user = User::new(format!("user{}@example.com", id), "hash", "Test", "User")
            .with_skills(have, want)
            .with_languages(languages);
        user.id = id;
        user
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_skill_keywords_normalizes() {
        assert_eq!(
            skill_keywords(" Python , guitar,,PYTHON , "),
            set(&["guitar", "python"])
        );
        assert!(skill_keywords("").is_empty());
        assert!(skill_keywords("  ,  , ").is_empty());
    }

    #[test]
    fn test_parse_languages() {
        assert_eq!(
            parse_languages("English, Spanish"),
            set(&["english", "spanish"])
        );
    }

    #[test]
    fn test_partial_ratio() {
        assert_eq!(partial_ratio("python", "python"), 100);
        assert_eq!(partial_ratio("Python", "python programming"), 100);
        assert_eq!(partial_ratio("python programming", "python"), 100);
        assert_eq!(partial_ratio("", "python"), 0);
        assert_eq!(partial_ratio("python", ""), 0);
        assert!(partial_ratio("guitar", "python") < DEFAULT_THRESHOLD);
        assert!(partial_ratio("javascript", "javascrpt") >= DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_partial_ratio_block_windows() {
        assert_eq!(partial_ratio("javascript", "jvacriipt"), 82);
        assert_eq!(partial_ratio("javascript", "javascrpt"), 89);
        assert_eq!(partial_ratio("spanish", "spanich"), 86);
        assert_eq!(partial_ratio("web design", "web development"), 60);
        assert_eq!(partial_ratio("machine learning", "learning"), 100);
        assert_eq!(partial_ratio("c++", "c#"), 50);
        // Equal lengths align the first argument
        assert_eq!(partial_ratio("guitar", "python"), 17);
        assert_eq!(partial_ratio("python", "guitar"), 18);
    }

    #[test]
    fn test_fuzzy_skill_match_checks_both_orientations() {
        assert_eq!(partial_ratio("eebced", "eeeebc"), 80);
        assert_eq!(partial_ratio("eeeebc", "eebced"), 67);

        let have = skill_keywords("eeeebc");
        let want = skill_keywords("eebced");
        assert_eq!(skill_similarity("eeeebc", "eebced"), 80);
        assert_eq!(fuzzy_skill_match(&have, &want, DEFAULT_THRESHOLD), have);
    }

    #[test]
    fn test_fuzzy_skill_match() {
        let have = set(&["python", "guitar", "cooking"]);
        let want = set(&["python programming", "piano"]);

        assert_eq!(fuzzy_skill_match(&have, &want, 80), set(&["python"]));
        assert!(fuzzy_skill_match(&have, &BTreeSet::new(), 80).is_empty());
    }

    #[test]
    fn test_common_languages_is_case_insensitive() {
        let a = user(1, "", "", "English, French");
        let b = user(2, "", "", "french,german");
        assert_eq!(common_languages(&a, &b), set(&["french"]));
    }

    #[test]
    fn test_mutual_match_example() {
        let a = user(1, "Python,Guitar", "Spanish", "English");
        let b = user(2, "Spanish", "Python", "English");
        let matcher = Matcher::default();

        let m = matcher.mutual_match(&a, &b).expect("expected a mutual match");
        assert_eq!(m.a_teaches, set(&["python"]));
        assert_eq!(m.b_teaches, set(&["spanish"]));
        assert_eq!(m.languages, set(&["english"]));
        assert!(!m.both_online);
        assert!(matcher.one_way_match(&a, &b).is_none());
    }

    #[test]
    fn test_no_shared_language_means_no_match() {
        let a = user(1, "Python", "Spanish", "English");
        let b = user(2, "Spanish", "Python", "German");
        let matcher = Matcher::default();

        assert!(matcher.mutual_match(&a, &b).is_none());
        assert!(matcher.one_way_match(&a, &b).is_none());
        assert_eq!(matcher.find_matches(&[a, b]), MatchReport::default());
    }

    #[test]
    fn test_one_way_match_orients_teacher() {
        let a = user(1, "", "Cooking", "English");
        let b = user(2, "Cooking", "", "English");
        let matcher = Matcher::default();

        let m = matcher.one_way_match(&a, &b).expect("expected a one-way match");
        assert_eq!(m.teacher.id, 2);
        assert_eq!(m.student.id, 1);
        assert_eq!(m.skills, set(&["cooking"]));
    }

    #[test]
    fn test_self_match_never_reported() {
        let a = user(1, "Python", "Python", "English");
        let matcher = Matcher::default();

        assert!(matcher.mutual_match(&a, &a).is_none());
        assert!(matcher.one_way_match(&a, &a).is_none());
        assert!(matcher.teaching_pairs(std::slice::from_ref(&a)).is_empty());
        assert_eq!(matcher.find_matches(std::slice::from_ref(&a)), MatchReport::default());
    }

    #[test]
    fn test_find_matches_scans_pairs_once() {
        let users = vec![
            user(1, "Python,Guitar", "Spanish", "English"),
            user(2, "Spanish", "Python", "English"),
            user(3, "Guitar", "", "English"),
            user(4, "", "Guitar", "English"),
        ];
        let report = Matcher::default().find_matches(&users);

        assert_eq!(report.mutual.len(), 1);
        assert_eq!(report.mutual[0].user_a.id, 1);
        assert_eq!(report.mutual[0].user_b.id, 2);

        let one_way: Vec<(i64, i64)> = report
            .one_way
            .iter()
            .map(|m| (m.teacher.id, m.student.id))
            .collect();
        assert_eq!(one_way, vec![(1, 4), (3, 4)]);
    }

    #[test]
    fn test_teaching_pairs_are_directed() {
        let users = vec![
            user(1, "Python", "Spanish", "English"),
            user(2, "Spanish", "Python", "English"),
        ];
        let pairs = Matcher::default().teaching_pairs(&users);

        let directed: Vec<(i64, i64)> = pairs.iter().map(|p| (p.teacher.id, p.student.id)).collect();
        assert_eq!(directed, vec![(1, 2), (2, 1)]);
    }

    #[test]
    fn test_matches_for_user() {
        let users = vec![
            user(1, "Python", "Spanish", "English"),
            user(2, "Spanish", "Python", "English"),
            user(3, "Spanish", "", "German"),
        ];
        let matcher = Matcher::default();

        let matches = matcher.matches_for_user(&users, 1).unwrap();
        assert_eq!(matches.can_teach.len(), 1);
        assert_eq!(matches.can_teach[0].user.id, 2);
        assert_eq!(matches.can_teach[0].skills, set(&["python"]));
        assert_eq!(matches.can_learn_from.len(), 1);
        assert_eq!(matches.can_learn_from[0].skills, set(&["spanish"]));

        assert!(matcher.matches_for_user(&users, 99).is_none());
    }

    #[test]
    fn test_match_stats_counts_live_matches() {
        let mut users = vec![
            user(1, "Python", "Spanish", "English"),
            user(2, "Spanish", "Python", "English"),
            user(3, "", "Python", "English"),
        ];
        users[0].is_online = true;
        users[1].is_online = true;

        let matcher = Matcher::default();
        let report = matcher.find_matches(&users);
        let stats = MatchStats::compute(&users, &report);

        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.active_users, 2);
        assert_eq!(stats.live_matches, 1);
        // The 1 -> 3 one-way match is not live.
        assert_eq!(stats.total_opportunities, 1);
    }

    #[test]
    fn test_threshold_clamped() {
        assert_eq!(Matcher::new(250).threshold(), 100);
        assert_eq!(Matcher::default().threshold(), DEFAULT_THRESHOLD);
    }
}
