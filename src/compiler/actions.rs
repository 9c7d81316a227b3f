use crate::error::{FirError, FirResult};
use std::collections::HashMap;

/// One authoring-time action, already parameter-validated. The variant set
/// is closed and small, so a sum type reads better here than a trait object
/// per action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveAction {
    Refresh { fragment: Option<String> },
    Remove,
    RemoveParent,
    Append { fragment: String },
    Prepend { fragment: String },
    Reset,
    ToggleDisabled,
    ToggleClass { classes: Vec<String> },
    Dispatch { events: Vec<String> },
    RunJs { name: String, js: String },
}

impl DirectiveAction {
    /// DOM-mutating actions replace/insert/remove the element's content;
    /// at most one may be attached to a given element.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            DirectiveAction::Refresh { .. }
                | DirectiveAction::Remove
                | DirectiveAction::RemoveParent
                | DirectiveAction::Append { .. }
                | DirectiveAction::Prepend { .. }
        )
    }

    /// The fragment name this action's produced attribute carries, if any.
    pub fn fragment(&self) -> Option<&str> {
        match self {
            DirectiveAction::Refresh { fragment } => fragment.as_deref(),
            DirectiveAction::Append { fragment } | DirectiveAction::Prepend { fragment } => {
                Some(fragment.as_str())
            }
            _ => None,
        }
    }

    /// True when the produced attribute carries no HTML payload and must be
    /// marked `.nohtml`.
    pub fn is_nohtml(&self) -> bool {
        matches!(
            self,
            DirectiveAction::Reset
                | DirectiveAction::ToggleDisabled
                | DirectiveAction::ToggleClass { .. }
                | DirectiveAction::Dispatch { .. }
                | DirectiveAction::RunJs { .. }
        )
    }

    /// The `$fir....()`/`$dispatch(...)` call emitted as the attribute
    /// value.
    pub fn js_call(&self) -> String {
        match self {
            DirectiveAction::Refresh { .. } => "$fir.replace()".to_owned(),
            DirectiveAction::Remove => "$fir.removeEl()".to_owned(),
            DirectiveAction::RemoveParent => "$fir.removeParentEl()".to_owned(),
            DirectiveAction::Append { .. } => "$fir.appendEl()".to_owned(),
            DirectiveAction::Prepend { .. } => "$fir.prependEl()".to_owned(),
            DirectiveAction::Reset => "$el.reset()".to_owned(),
            DirectiveAction::ToggleDisabled => "$fir.toggleDisabled()".to_owned(),
            DirectiveAction::ToggleClass { classes } => {
                format!("$fir.toggleClass({})", quote_list(classes))
            }
            DirectiveAction::Dispatch { events } => format!("$dispatch({})", quote_list(events)),
            DirectiveAction::RunJs { js, .. } => js.clone(),
        }
    }
}

fn quote_list(items: &[String]) -> String {
    items
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parses the directive action name (`refresh`, `toggleClass`, ...) and its
/// optional `:<param>` suffix into a validated `DirectiveAction`.
/// Authoring errors here (empty bracket lists, unknown `runjs` names) fail
/// route construction, not request handling.
pub fn parse_action(
    name: &str,
    param: Option<&str>,
    action_map: &HashMap<String, String>,
) -> FirResult<DirectiveAction> {
    match name {
        "refresh" => Ok(DirectiveAction::Refresh {
            fragment: param.map(str::to_owned),
        }),
        "remove" => Ok(DirectiveAction::Remove),
        "remove-parent" => Ok(DirectiveAction::RemoveParent),
        "append" => Ok(DirectiveAction::Append {
            fragment: require_param(name, param)?,
        }),
        "prepend" => Ok(DirectiveAction::Prepend {
            fragment: require_param(name, param)?,
        }),
        "reset" => Ok(DirectiveAction::Reset),
        "toggle-disabled" => Ok(DirectiveAction::ToggleDisabled),
        "toggleClass" => Ok(DirectiveAction::ToggleClass {
            classes: parse_bracket_list(name, param)?,
        }),
        "dispatch" => Ok(DirectiveAction::Dispatch {
            events: parse_bracket_list(name, param)?,
        }),
        "runjs" => {
            let name_param = require_param(name, param)?;
            let js = action_map.get(&name_param).filter(|s| !s.is_empty());
            match js {
                Some(js) => Ok(DirectiveAction::RunJs {
                    name: name_param,
                    js: js.clone(),
                }),
                None => Err(FirError::Authoring(format!(
                    "runjs action '{name_param}' is not registered in the action map"
                ))),
            }
        }
        other => Err(FirError::Authoring(format!("unknown directive action '{other}'"))),
    }
}

fn require_param(action: &str, param: Option<&str>) -> FirResult<String> {
    match param {
        Some(p) if !p.trim().is_empty() => Ok(p.trim().to_owned()),
        _ => Err(FirError::Authoring(format!(
            "'{action}' requires a non-empty parameter"
        ))),
    }
}

fn parse_bracket_list(action: &str, param: Option<&str>) -> FirResult<Vec<String>> {
    let raw = require_param(action, param)?;
    let inner = raw
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| {
            FirError::Authoring(format!(
                "'{action}' parameter must be a bracketed list, e.g. [a,b]"
            ))
        })?;
    let items: Vec<String> = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    if items.is_empty() {
        return Err(FirError::Authoring(format!(
            "'{action}' requires at least one item in its bracketed list"
        )));
    }
    Ok(items)
}
