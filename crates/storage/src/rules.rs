//! Entity mutation rules shared by both backends.
//!
//! Budget, context-window, and pagination arithmetic lives here so the
//! in-memory and SQLite ports cannot drift apart: each backend loads the
//! record, applies the rule, and writes the result back inside its own
//! critical section or transaction.

use chrono::{DateTime, Utc};

use pa_domain::agent::{AgentRecord, QuotaPeriod};
use pa_domain::memory::{MemoryItem, MemoryPage, MemoryQuery, MemorySort};
use pa_domain::session::Session;
use pa_domain::{Error, Result};

/// Reset-then-consume. Mutates the record in place and returns the
/// remaining allowance.
pub(crate) fn consume_budget(
    agent: &mut AgentRecord,
    tokens: u64,
    now: DateTime<Utc>,
) -> Result<u64> {
    let window_expired = match agent.budget_reset_at {
        Some(reset_at) => reset_at <= now,
        // No window yet: open the first one. Lifetime budgets have no
        // window at all and accumulate forever.
        None => !matches!(agent.quota_period, QuotaPeriod::Lifetime),
    };
    let (consumed, reset_at) = if window_expired {
        (0, agent.quota_period.next_reset(now))
    } else {
        (agent.tokens_consumed, agent.budget_reset_at)
    };

    let remaining = agent.token_budget.saturating_sub(consumed);
    if tokens > remaining {
        // No mutation on failure: both backends reject identically.
        return Err(Error::TokenBudgetExceeded {
            agent_id: agent.agent_id.clone(),
            requested_tokens: tokens,
            remaining_tokens: remaining,
        });
    }

    agent.tokens_consumed = consumed + tokens;
    agent.budget_reset_at = reset_at;
    Ok(agent.token_budget - agent.tokens_consumed)
}

/// Apply a signed delta to the context window. Negative results clamp at
/// zero; exceeding capacity fails without mutating the session.
pub(crate) fn apply_window_delta(session: &mut Session, delta: i64) -> Result<u64> {
    let attempted = if delta.is_negative() {
        session.tokens_used.saturating_sub(delta.unsigned_abs())
    } else {
        session.tokens_used.saturating_add(delta as u64)
    };

    if attempted > session.token_capacity {
        return Err(Error::ContextWindowExceeded {
            session_id: session.session_id.clone(),
            token_capacity: session.token_capacity,
            attempted_tokens_used: attempted,
        });
    }

    session.tokens_used = attempted;
    Ok(attempted)
}

/// Whether an item matches the query's filters (everything but paging).
pub(crate) fn memory_matches(item: &MemoryItem, query: &MemoryQuery) -> bool {
    if let Some(agent_id) = &query.agent_id {
        if &item.agent_id != agent_id {
            return false;
        }
    }
    if let Some(tier) = query.tier {
        if item.tier != tier {
            return false;
        }
    }
    if let Some(scope) = query.scope {
        if item.scope != scope {
            return false;
        }
    }
    if let Some(text) = &query.text {
        if !item
            .content
            .to_lowercase()
            .contains(&text.to_lowercase())
        {
            return false;
        }
    }
    true
}

/// Sort matches, slice out the requested page, and compute the
/// continuation cursor (an offset rendered as a string).
pub(crate) fn paginate_memory(mut matches: Vec<MemoryItem>, query: &MemoryQuery) -> Result<MemoryPage> {
    matches.sort_by(|a, b| {
        let ord = a
            .created_at
            .cmp(&b.created_at)
            .then_with(|| a.memory_item_id.cmp(&b.memory_item_id));
        match query.sort {
            MemorySort::CreatedAsc => ord,
            MemorySort::CreatedDesc => ord.reverse(),
        }
    });

    let offset = match &query.cursor {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| Error::entity("memory", format!("bad cursor: {raw}")))?,
        None => 0,
    };

    let total_count = matches.len() as u64;
    let limit = query.limit.max(1) as usize;
    let end = offset.saturating_add(limit).min(matches.len());
    let items: Vec<MemoryItem> = matches
        .get(offset..end)
        .map(|s| s.to_vec())
        .unwrap_or_default();

    let cursor = if end < matches.len() {
        Some(end.to_string())
    } else {
        None
    };

    Ok(MemoryPage {
        items,
        cursor,
        total_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pa_domain::agent::QuotaPeriod;
    use pa_domain::memory::{MemoryScope, MemorySource, MemoryTier, Sensitivity};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap()
    }

    fn agent(budget: u64) -> AgentRecord {
        AgentRecord::new("a1", budget, QuotaPeriod::Daily)
    }

    #[test]
    fn first_consume_opens_window() {
        let mut a = agent(100);
        let remaining = consume_budget(&mut a, 30, t0()).unwrap();
        assert_eq!(remaining, 70);
        assert_eq!(a.tokens_consumed, 30);
        assert_eq!(a.budget_reset_at, Some(t0() + chrono::Duration::days(1)));
    }

    #[test]
    fn expired_window_resets_to_requested_amount() {
        let mut a = agent(100);
        consume_budget(&mut a, 90, t0()).unwrap();
        // One day later the window has rolled over.
        let later = t0() + chrono::Duration::days(1);
        consume_budget(&mut a, 40, later).unwrap();
        assert_eq!(a.tokens_consumed, 40);
        assert_eq!(a.budget_reset_at, Some(later + chrono::Duration::days(1)));
    }

    #[test]
    fn over_budget_is_rejected_without_mutation() {
        let mut a = agent(100);
        consume_budget(&mut a, 90, t0()).unwrap();
        let err = consume_budget(&mut a, 20, t0()).unwrap_err();
        match err {
            Error::TokenBudgetExceeded {
                requested_tokens,
                remaining_tokens,
                ..
            } => {
                assert_eq!(requested_tokens, 20);
                assert_eq!(remaining_tokens, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(a.tokens_consumed, 90);
    }

    #[test]
    fn lifetime_budget_never_reopens() {
        let mut a = AgentRecord::new("a1", 100, QuotaPeriod::Lifetime);
        consume_budget(&mut a, 60, t0()).unwrap();
        assert_eq!(a.budget_reset_at, None);
        // A year later nothing resets; only 40 remain.
        let later = t0() + chrono::Duration::days(365);
        assert!(consume_budget(&mut a, 50, later).is_err());
        assert!(consume_budget(&mut a, 40, later).is_ok());
    }

    #[test]
    fn window_delta_clamps_at_zero() {
        let mut s = Session::new("s1", "c1", 100);
        s.tokens_used = 10;
        assert_eq!(apply_window_delta(&mut s, -50).unwrap(), 0);
    }

    #[test]
    fn window_breach_reports_attempted_value() {
        let mut s = Session::new("s1", "c1", 100);
        s.tokens_used = 90;
        let err = apply_window_delta(&mut s, 20).unwrap_err();
        match err {
            Error::ContextWindowExceeded {
                token_capacity,
                attempted_tokens_used,
                ..
            } => {
                assert_eq!(token_capacity, 100);
                assert_eq!(attempted_tokens_used, 110);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(s.tokens_used, 90);
    }

    fn item(id: &str, minute: u32) -> MemoryItem {
        MemoryItem {
            memory_item_id: id.into(),
            agent_id: "a1".into(),
            tier: MemoryTier::Semantic,
            scope: MemoryScope::Global,
            source: MemorySource::Agent,
            content: format!("note {id}"),
            metadata_json: None,
            generated_by_turn_id: None,
            session_id: None,
            sensitivity: Sensitivity::Internal,
            created_at: Utc.with_ymd_and_hms(2024, 6, 15, 10, minute, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 6, 15, 10, minute, 0).unwrap(),
        }
    }

    #[test]
    fn pagination_walks_pages_with_stable_total() {
        let matches: Vec<MemoryItem> = (0..25).map(|i| item(&format!("m{i:02}"), i)).collect();
        let mut query = MemoryQuery {
            limit: 10,
            ..Default::default()
        };

        let page1 = paginate_memory(matches.clone(), &query).unwrap();
        assert_eq!(page1.items.len(), 10);
        assert_eq!(page1.total_count, 25);
        assert_eq!(page1.items[0].memory_item_id, "m24"); // newest first

        query.cursor = page1.cursor.clone();
        let page2 = paginate_memory(matches.clone(), &query).unwrap();
        assert_eq!(page2.items.len(), 10);
        assert_eq!(page2.total_count, 25);

        query.cursor = page2.cursor.clone();
        let page3 = paginate_memory(matches, &query).unwrap();
        assert_eq!(page3.items.len(), 5);
        assert_eq!(page3.cursor, None);
        assert_eq!(page3.total_count, 25);
    }

    #[test]
    fn ascending_sort_reverses_order() {
        let matches: Vec<MemoryItem> = (0..3).map(|i| item(&format!("m{i}"), i)).collect();
        let query = MemoryQuery {
            sort: MemorySort::CreatedAsc,
            limit: 10,
            ..Default::default()
        };
        let page = paginate_memory(matches, &query).unwrap();
        assert_eq!(page.items[0].memory_item_id, "m0");
        assert_eq!(page.items[2].memory_item_id, "m2");
    }
}
