//! Content filter for comments and rating reviews
//!
//! Text is sanitized first, then checked against reject rules (hard limits)
//! and review rules (heuristics that hold content for a moderator).

use regex::Regex;
use std::fmt;

use crate::application::errors::ApplicationError;
use crate::config::ModerationConfig;
use crate::domain::community::value_objects::{Privilege, ReputationLevel};

/// Letters needed before the capitals heuristic applies
const MIN_LETTERS_FOR_CAPS_CHECK: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct AuthorContext {
    pub reputation_level: ReputationLevel,
}

impl AuthorContext {
    pub fn has_privilege(&self, privilege: Privilege) -> bool {
        self.reputation_level >= privilege.required_level()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Review,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Empty,
    TooLong { max: usize },
    BannedTerm(String),
    TooManyLinks { max: usize },
    LinksRequireReputation,
    RepeatedCharacters,
    ExcessiveCapitals,
    FlaggedPattern(String),
}

impl Violation {
    pub fn rejects(&self) -> bool {
        matches!(
            self,
            Violation::Empty
                | Violation::TooLong { .. }
                | Violation::BannedTerm(_)
                | Violation::TooManyLinks { .. }
        )
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Empty => write!(f, "content is empty"),
            Violation::TooLong { max } => write!(f, "content exceeds {} characters", max),
            Violation::BannedTerm(term) => write!(f, "contains banned term '{}'", term),
            Violation::TooManyLinks { max } => write!(f, "contains more than {} links", max),
            Violation::LinksRequireReputation => {
                write!(f, "links require the post_links privilege")
            }
            Violation::RepeatedCharacters => write!(f, "contains long runs of repeated characters"),
            Violation::ExcessiveCapitals => write!(f, "contains excessive capital letters"),
            Violation::FlaggedPattern(pattern) => write!(f, "matches flagged pattern '{}'", pattern),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModerationVerdict {
    pub decision: Decision,
    pub violations: Vec<Violation>,
    pub sanitized: String,
}

impl ModerationVerdict {
    pub fn violation_messages(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.to_string()).collect()
    }
}

pub struct ContentFilterService {
    config: ModerationConfig,
    excess_newlines: Regex,
    links: Regex,
    banned_terms: Option<Regex>,
    review_patterns: Vec<(String, Regex)>,
}

impl ContentFilterService {
    /// Compiles every pattern up front; a bad configured regex is a
    /// configuration error
    pub fn new(config: ModerationConfig) -> Result<Self, ApplicationError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| ApplicationError::Configuration {
                message: format!("invalid moderation pattern '{}': {}", pattern, e),
            })
        };

        let terms: Vec<String> = config
            .banned_terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(regex::escape)
            .collect();
        let banned_terms = if terms.is_empty() {
            None
        } else {
            Some(compile(&format!(r"(?i)\b(?:{})\b", terms.join("|")))?)
        };

        let review_patterns = config
            .review_patterns
            .iter()
            .map(|p| compile(p).map(|re| (p.clone(), re)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            excess_newlines: compile(r"\n{3,}")?,
            links: compile(r"(?i)\b(?:https?://|www\.)[^\s<>]+")?,
            banned_terms,
            review_patterns,
            config,
        })
    }

    /// Control characters other than newline and tab are dropped, blank line
    /// runs are collapsed, and the ends are trimmed
    pub fn sanitize(&self, text: &str) -> String {
        let stripped: String = text
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect();
        self.excess_newlines
            .replace_all(&stripped, "\n\n")
            .trim()
            .to_string()
    }

    pub fn evaluate(&self, text: &str, author: AuthorContext) -> ModerationVerdict {
        let sanitized = self.sanitize(text);
        let mut violations = Vec::new();

        if sanitized.is_empty() {
            violations.push(Violation::Empty);
        }
        if sanitized.chars().count() > self.config.max_length {
            violations.push(Violation::TooLong {
                max: self.config.max_length,
            });
        }
        if let Some(banned) = &self.banned_terms {
            let mut seen: Vec<String> = Vec::new();
            for found in banned.find_iter(&sanitized) {
                let term = found.as_str().to_lowercase();
                if !seen.contains(&term) {
                    seen.push(term);
                }
            }
            violations.extend(seen.into_iter().map(Violation::BannedTerm));
        }

        let link_count = self.links.find_iter(&sanitized).count();
        if link_count > self.config.max_links {
            violations.push(Violation::TooManyLinks {
                max: self.config.max_links,
            });
        }

        if link_count > 0 && !author.has_privilege(Privilege::PostLinks) {
            violations.push(Violation::LinksRequireReputation);
        }
        if self.has_repeated_run(&sanitized) {
            violations.push(Violation::RepeatedCharacters);
        }
        if self.is_shouting(&sanitized) {
            violations.push(Violation::ExcessiveCapitals);
        }
        for (pattern, re) in &self.review_patterns {
            if re.is_match(&sanitized) {
                violations.push(Violation::FlaggedPattern(pattern.clone()));
            }
        }

        let decision = if violations.iter().any(Violation::rejects) {
            Decision::Reject
        } else if violations.is_empty() || author.has_privilege(Privilege::SkipReview) {
            Decision::Allow
        } else {
            Decision::Review
        };

        ModerationVerdict {
            decision,
            violations,
            sanitized,
        }
    }

    /// Whitespace runs (indentation, blank lines) do not count
    fn has_repeated_run(&self, text: &str) -> bool {
        let limit = self.config.max_repeated_chars;
        if limit == 0 {
            return false;
        }
        let mut previous = None;
        let mut run = 0usize;
        for c in text.chars() {
            if Some(c) == previous {
                run += 1;
            } else {
                previous = Some(c);
                run = 1;
            }
            if run >= limit && !c.is_whitespace() {
                return true;
            }
        }
        false
    }

    fn is_shouting(&self, text: &str) -> bool {
        let (letters, upper) = text
            .chars()
            .filter(|c| c.is_alphabetic())
            .fold((0usize, 0usize), |(letters, upper), c| {
                (letters + 1, upper + usize::from(c.is_uppercase()))
            });
        letters >= MIN_LETTERS_FOR_CAPS_CHECK
            && (upper as f64 / letters as f64) > self.config.max_uppercase_ratio
    }
}
