//! Skill-action catalog queries.

use serde::{Deserialize, Serialize};

use crate::models::skill::SkillAction;

/// Catalog rows sharing a category, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillCategory {
    pub category: String,
    pub description: Option<String>,
    pub actions: Vec<SkillAction>,
}

/// Case-insensitive substring match over action name, description and
/// category. An empty or blank query keeps everything.
pub fn filter_actions(actions: Vec<SkillAction>, query: Option<&str>) -> Vec<SkillAction> {
    let needle = match query.map(str::trim) {
        Some(q) if !q.is_empty() => q.to_lowercase(),
        _ => return actions,
    };
    actions
        .into_iter()
        .filter(|a| {
            let hit = |s: &str| s.to_lowercase().contains(&needle);
            hit(&a.action)
                || hit(&a.category)
                || a.action_description.as_deref().is_some_and(hit)
        })
        .collect()
}

pub fn group_by_category(actions: Vec<SkillAction>) -> Vec<SkillCategory> {
    let mut groups: Vec<SkillCategory> = Vec::new();
    for action in actions {
        match groups.iter_mut().find(|g| g.category == action.category) {
            Some(group) => {
                if group.description.is_none() {
                    group.description = action.category_description.clone();
                }
                group.actions.push(action);
            }
            None => groups.push(SkillCategory {
                category: action.category.clone(),
                description: action.category_description.clone(),
                actions: vec![action],
            }),
        }
    }
    groups
}
