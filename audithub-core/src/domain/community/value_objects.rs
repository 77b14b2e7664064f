//! Community value objects: identifiers, statuses, votes, reputation vocabulary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Audit report a comment or rating is attached to. Opaque to this service.
    ReportId
);
uuid_id!(CommentId);
uuid_id!(RatingId);

/// Visibility state of a comment or rating review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Published,
    /// Held for moderator review
    Pending,
    /// Taken down by a moderator
    Removed,
    /// Withdrawn by its author
    Deleted,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Published => "published",
            ContentStatus::Pending => "pending",
            ContentStatus::Removed => "removed",
            ContentStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "published" => Ok(ContentStatus::Published),
            "pending" => Ok(ContentStatus::Pending),
            "removed" => Ok(ContentStatus::Removed),
            "deleted" => Ok(ContentStatus::Deleted),
            other => Err(format!("unknown content status '{}'", other)),
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single up or down vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn as_i16(&self) -> i16 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }
}

impl TryFrom<i16> for VoteValue {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            other => Err(format!("vote value must be 1 or -1, got {}", other)),
        }
    }
}

/// Star rating between 1 and 5
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatingScore(u8);

impl RatingScore {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(score: u8) -> Result<Self, String> {
        if (Self::MIN..=Self::MAX).contains(&score) {
            Ok(Self(score))
        } else {
            Err(format!(
                "rating must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                score
            ))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Ledger event kinds that move reputation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReputationEventKind {
    CommentPublished,
    CommentUpvoted,
    CommentDownvoted,
    CommentRemoved,
    RatingSubmitted,
    /// A voter changed or withdrew a vote; points carry the net delta
    VoteRetracted,
}

impl ReputationEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReputationEventKind::CommentPublished => "comment_published",
            ReputationEventKind::CommentUpvoted => "comment_upvoted",
            ReputationEventKind::CommentDownvoted => "comment_downvoted",
            ReputationEventKind::CommentRemoved => "comment_removed",
            ReputationEventKind::RatingSubmitted => "rating_submitted",
            ReputationEventKind::VoteRetracted => "vote_retracted",
        }
    }
}

impl FromStr for ReputationEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comment_published" => Ok(ReputationEventKind::CommentPublished),
            "comment_upvoted" => Ok(ReputationEventKind::CommentUpvoted),
            "comment_downvoted" => Ok(ReputationEventKind::CommentDownvoted),
            "comment_removed" => Ok(ReputationEventKind::CommentRemoved),
            "rating_submitted" => Ok(ReputationEventKind::RatingSubmitted),
            "vote_retracted" => Ok(ReputationEventKind::VoteRetracted),
            other => Err(format!("unknown reputation event '{}'", other)),
        }
    }
}

/// Reputation tier, ordered from lowest to highest
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ReputationLevel {
    Newcomer,
    Contributor,
    Trusted,
    Expert,
}

impl ReputationLevel {
    pub fn next(&self) -> Option<ReputationLevel> {
        match self {
            ReputationLevel::Newcomer => Some(ReputationLevel::Contributor),
            ReputationLevel::Contributor => Some(ReputationLevel::Trusted),
            ReputationLevel::Trusted => Some(ReputationLevel::Expert),
            ReputationLevel::Expert => None,
        }
    }
}

/// Capabilities unlocked by reputation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    PostLinks,
    Downvote,
    SkipReview,
    Moderate,
}

impl Privilege {
    /// Lowest level that grants this privilege
    pub fn required_level(&self) -> ReputationLevel {
        match self {
            Privilege::PostLinks | Privilege::Downvote => ReputationLevel::Contributor,
            Privilege::SkipReview => ReputationLevel::Trusted,
            Privilege::Moderate => ReputationLevel::Expert,
        }
    }

    pub fn granted_at(level: ReputationLevel) -> Vec<Privilege> {
        [
            Privilege::PostLinks,
            Privilege::Downvote,
            Privilege::SkipReview,
            Privilege::Moderate,
        ]
        .into_iter()
        .filter(|p| level >= p.required_level())
        .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::PostLinks => "post_links",
            Privilege::Downvote => "downvote",
            Privilege::SkipReview => "skip_review",
            Privilege::Moderate => "moderate",
        }
    }
}

/// Community actions with their own per-user rate limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommunityAction {
    Comment,
    Vote,
    Rating,
}

impl CommunityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommunityAction::Comment => "comment",
            CommunityAction::Vote => "vote",
            CommunityAction::Rating => "rating",
        }
    }
}

impl fmt::Display for CommunityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_score_bounds() {
        assert!(RatingScore::new(0).is_err());
        assert!(RatingScore::new(6).is_err());
        assert_eq!(RatingScore::new(5).unwrap().value(), 5);
    }

    #[test]
    fn vote_value_from_wire() {
        assert_eq!(VoteValue::try_from(1).unwrap(), VoteValue::Up);
        assert_eq!(VoteValue::try_from(-1).unwrap(), VoteValue::Down);
        assert!(VoteValue::try_from(0).is_err());
    }

    #[test]
    fn privileges_accumulate_with_level() {
        assert!(Privilege::granted_at(ReputationLevel::Newcomer).is_empty());
        assert_eq!(
            Privilege::granted_at(ReputationLevel::Contributor),
            vec![Privilege::PostLinks, Privilege::Downvote]
        );
        assert_eq!(Privilege::granted_at(ReputationLevel::Expert).len(), 4);
    }

    #[test]
    fn event_kind_string_round_trip() {
        for kind in [
            ReputationEventKind::CommentPublished,
            ReputationEventKind::VoteRetracted,
        ] {
            assert_eq!(kind.as_str().parse::<ReputationEventKind>().unwrap(), kind);
        }
    }
}
