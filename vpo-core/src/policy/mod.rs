//! Policy model, conditional rules, and the pure evaluator.

pub mod actions;
pub mod conditions;
pub mod discovery;
pub mod evaluator;
pub mod matchers;
pub mod rules;
pub mod types;

pub use actions::{RuleAction, SkipFlags, TrackFlag, TrackSelector};
pub use conditions::{Condition, ConditionContext, MetadataOperator};
pub use discovery::{find_policy, list_policies, load_named_policy, load_policy, parse_policy};
pub use evaluator::{evaluate, EvaluationError, EvaluationSignals};
pub use matchers::CommentaryMatcher;
pub use rules::{ConditionalResult, ConditionalRule, MatchMode, RuleEvaluation, RulesConfig};
pub use types::{
    OnError, PhaseDefinition, PhaseName, PhaseSkipCondition, PolicyConfig, PolicyDocument,
    TrackCategory, TranscodeConfig, TranscriptionSettings,
};
