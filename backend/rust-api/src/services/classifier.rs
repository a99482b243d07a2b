//! Rule-based mapping from a metrics snapshot to symbolic feedback codes.
//!
//! Thresholds live in ordered tier tables (highest tier first) so the rules
//! can be tested table-by-table instead of branch-by-branch. A metric family
//! fires at most one code.

use crate::models::metrics::{ClassificationCodes, MetricsSnapshot, Period};

struct Tier {
    min: f64,
    code: &'static str,
}

const ENGAGEMENT_TIERS: &[Tier] = &[
    Tier { min: 0.8, code: "ENGAGEMENT_HIGH" },
    Tier { min: 0.6, code: "ENGAGEMENT_GOOD" },
    Tier { min: 0.4, code: "ENGAGEMENT_AVERAGE" },
];

const STREAK_TIERS: &[Tier] = &[
    Tier { min: 7.0, code: "STREAK_7" },
    Tier { min: 5.0, code: "STREAK_5" },
    Tier { min: 3.0, code: "STREAK_3" },
];

const COMPLETION_TIERS: &[Tier] = &[
    Tier { min: 0.9, code: "COMPLETION_EXCELLENT" },
    Tier { min: 0.7, code: "COMPLETION_GOOD" },
    Tier { min: 0.5, code: "COMPLETION_AVERAGE" },
];

const MASTERY_TIERS: &[Tier] = &[
    Tier { min: 0.9, code: "MASTERY_EXCELLENT" },
    Tier { min: 0.8, code: "MASTERY_GOOD" },
    Tier { min: 0.7, code: "MASTERY_AVERAGE" },
];

const PERSEVERANCE_TIERS: &[Tier] = &[
    Tier { min: 5.0, code: "PERSEVERANCE_STRONG" },
    Tier { min: 3.0, code: "PERSEVERANCE_GOOD" },
];

const TIME_TIERS: &[Tier] = &[
    Tier { min: 300.0, code: "TIME_HIGH" },
    Tier { min: 180.0, code: "TIME_MEDIUM" },
];

fn highest_tier(tiers: &[Tier], value: f64) -> Option<&'static str> {
    tiers.iter().find(|t| value >= t.min).map(|t| t.code)
}

/// Turns a snapshot into achievements / alerts / recommendations. Total over
/// any well-formed snapshot; a window without attempts short-circuits to the
/// fixed no-activity response before any rule runs.
pub fn classify(metrics: &MetricsSnapshot, period: Period) -> ClassificationCodes {
    if metrics.completion_rate.started == 0 {
        return ClassificationCodes {
            achievements: Vec::new(),
            alerts: Vec::new(),
            recommendations: vec!["DEFAULT_NO_ACTIVITY".to_string()],
        };
    }

    let mut achievements = Vec::new();
    let mut alerts = Vec::new();
    let mut recommendations = Vec::new();

    match highest_tier(ENGAGEMENT_TIERS, metrics.engagement.rate()) {
        Some(code) => achievements.push(code.to_string()),
        None => alerts.push("ENGAGEMENT_LOW".to_string()),
    }

    if let Some(code) = highest_tier(STREAK_TIERS, f64::from(metrics.streak)) {
        achievements.push(code.to_string());
    }

    let completed = metrics.completion_rate.completed;
    let started = metrics.completion_rate.started;
    if started > 0 {
        let rate = f64::from(completed) / f64::from(started);
        if let Some(code) = highest_tier(COMPLETION_TIERS, rate) {
            achievements.push(code.to_string());
        }
        if rate < 0.5 && started > 3 {
            alerts.push("COMPLETION_LOW_ALERT".to_string());
        }
    }

    let mut subjects: Vec<_> = metrics.mastery.iter().collect();
    subjects.sort_by(|a, b| a.0.cmp(b.0));
    for (subject, score) in subjects {
        if let Some(code) = highest_tier(MASTERY_TIERS, *score) {
            achievements.push(format!("{}_{}", code, subject));
        } else if *score < 0.5 {
            alerts.push(format!("MASTERY_LOW_ALERT_{}", subject));
        }
    }

    if metrics.abandonment_rate.aborted > 0 {
        alerts.push("ABANDON_ALERT".to_string());
    }

    match highest_tier(
        PERSEVERANCE_TIERS,
        f64::from(metrics.perseverance.improved),
    ) {
        Some(code) => achievements.push(code.to_string()),
        None if metrics.perseverance.retries > 0 => {
            achievements.push("PERSEVERANCE_RETRIES".to_string())
        }
        None => {}
    }

    if metrics.subject_balance < 40 {
        recommendations.push("BALANCE_LOW".to_string());
    } else if metrics.subject_balance >= 80 {
        achievements.push("BALANCE_GOOD".to_string());
    }

    if metrics.recommendation != "none" {
        recommendations.push(format!("RECOMMEND_{}", metrics.recommendation));
    }

    match highest_tier(TIME_TIERS, metrics.time_spent) {
        Some(code) => achievements.push(code.to_string()),
        None if metrics.time_spent > 0.0 => alerts.push("TIME_LOW".to_string()),
        None => {}
    }

    match period {
        Period::Week => achievements.push("INSPIRATION_WEEK".to_string()),
        Period::Month => achievements.push("INSPIRATION_MONTH".to_string()),
        Period::Custom => {}
    }

    if achievements.is_empty() {
        achievements.push("DEFAULT_ACHIEVEMENT".to_string());
    }
    if alerts.is_empty() {
        alerts.push("DEFAULT_ALERT".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push("DEFAULT_RECOMMENDATION".to_string());
    }

    ClassificationCodes {
        achievements,
        alerts,
        recommendations,
    }
}
