pub mod character;
pub mod skill;
pub mod thread;

pub use character::{Character, CharacterStatus, CharacterTransition, SkillTotals};
pub use skill::{
    build_claim_lines, ClaimLine, ClaimStatus, Decision, SkillAction, SkillPointClaim,
    SkillWeights,
};
pub use thread::{is_claim_eligible, ArchiveGuidance, Author, ForumLocation, Post, Thread, ThreadState};
