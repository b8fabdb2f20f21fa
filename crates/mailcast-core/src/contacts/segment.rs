//! Segment rule evaluation

use mailcast_common::{Error, Result};
use mailcast_storage::models::{Combinator, Contact, Rule, RuleOperator, RuleSet};

/// Select the contacts matching `rule_set`, preserving input order.
///
/// An empty rule set matches nothing.
pub fn evaluate(contacts: &[Contact], rule_set: &RuleSet) -> Vec<Contact> {
    if rule_set.rules.is_empty() {
        return Vec::new();
    }

    contacts
        .iter()
        .filter(|contact| matches_rule_set(contact, rule_set))
        .cloned()
        .collect()
}

/// Whether a single contact satisfies the rule set
pub fn matches_rule_set(contact: &Contact, rule_set: &RuleSet) -> bool {
    if rule_set.rules.is_empty() {
        return false;
    }
    match rule_set.combinator {
        Combinator::And => rule_set.rules.iter().all(|rule| matches_rule(contact, rule)),
        Combinator::Or => rule_set.rules.iter().any(|rule| matches_rule(contact, rule)),
    }
}

/// Evaluate one rule against a contact, case-insensitively
pub fn matches_rule(contact: &Contact, rule: &Rule) -> bool {
    let value = contact
        .attribute(&rule.field)
        .map(|v| v.to_lowercase())
        .filter(|v| !v.is_empty());

    let Some(value) = value else {
        return rule.operator == RuleOperator::NotExists;
    };

    let expected = rule.value.to_lowercase();
    match rule.operator {
        RuleOperator::Equals => value == expected,
        RuleOperator::NotEquals => value != expected,
        RuleOperator::Contains => value.contains(&expected),
        RuleOperator::NotContains => !value.contains(&expected),
        RuleOperator::StartsWith => value.starts_with(&expected),
        RuleOperator::EndsWith => value.ends_with(&expected),
        RuleOperator::Exists => true,
        RuleOperator::NotExists => false,
    }
}

/// Reject rules that cannot be evaluated meaningfully
pub fn validate(rule_set: &RuleSet) -> Result<()> {
    for (i, rule) in rule_set.rules.iter().enumerate() {
        if rule.field.trim().is_empty() {
            return Err(Error::Validation(format!("Rule {} has an empty field", i + 1)));
        }
    }
    Ok(())
}
