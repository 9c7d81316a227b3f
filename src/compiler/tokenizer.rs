use crate::error::{FirError, FirResult};
use fir_protocol::EventState;

/// One `<event-id>[:<state>]` clause from an event-expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventClause {
    pub event_id: String,
    pub state: EventState,
}

/// Parses an attribute value such as `create:ok,update:ok;delete` into its
/// independent groups. Semicolons separate clauses that each produce their
/// own attribute; commas within one clause group events onto a single
/// attribute.
pub fn parse_event_expression(expr: &str) -> FirResult<Vec<Vec<EventClause>>> {
    expr.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_group)
        .collect()
}

fn parse_group(group: &str) -> FirResult<Vec<EventClause>> {
    let clauses: FirResult<Vec<EventClause>> = group
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_clause)
        .collect();
    let clauses = clauses?;
    if clauses.is_empty() {
        return Err(FirError::Authoring(
            "event expression must name at least one event".to_owned(),
        ));
    }
    Ok(clauses)
}

fn parse_clause(clause: &str) -> FirResult<EventClause> {
    match clause.split_once(':') {
        Some((id, state)) => {
            let id = id.trim();
            if id.is_empty() {
                return Err(FirError::Authoring("event id must not be empty".to_owned()));
            }
            Ok(EventClause {
                event_id: id.to_owned(),
                state: parse_state(state.trim())?,
            })
        }
        None => Ok(EventClause {
            event_id: clause.to_owned(),
            state: EventState::Ok,
        }),
    }
}

fn parse_state(state: &str) -> FirResult<EventState> {
    match state {
        "ok" => Ok(EventState::Ok),
        "error" => Ok(EventState::Error),
        "pending" => Ok(EventState::Pending),
        "done" => Ok(EventState::Done),
        other => Err(FirError::Authoring(format!("unknown event state '{other}'"))),
    }
}
