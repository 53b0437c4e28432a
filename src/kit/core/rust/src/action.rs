/* src/kit/core/rust/src/action.rs */

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::control::{ActionFailure, LoadError};

/// What a form action returned without raising.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
  Success(Option<Value>),
  Failure(ActionFailure),
}

impl From<ActionFailure> for ActionOutput {
  fn from(f: ActionFailure) -> Self {
    Self::Failure(f)
  }
}

impl From<Value> for ActionOutput {
  fn from(v: Value) -> Self {
    Self::Success(Some(v))
  }
}

impl From<()> for ActionOutput {
  fn from((): ()) -> Self {
    Self::Success(None)
  }
}

/// Wire shape of a form action outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionResult {
  Success {
    status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
  },
  Failure {
    status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
  },
  Redirect {
    status: u16,
    location: String,
  },
  Error {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    error: Value,
  },
}

impl ActionResult {
  /// Fold an action's return value into its wire shape. `handle_error` is only
  /// consulted for unexpected errors.
  pub fn from_outcome(
    outcome: Result<ActionOutput, LoadError>,
    handle_error: impl FnOnce(&LoadError) -> Value,
  ) -> Self {
    match outcome {
      Ok(ActionOutput::Success(data)) => Self::Success { status: 200, data },
      Ok(ActionOutput::Failure(f)) => Self::Failure { status: f.status, data: f.data },
      Err(LoadError::Redirect(r)) => Self::Redirect { status: r.status, location: r.location },
      Err(LoadError::Http(e)) => Self::Error { status: Some(e.status), error: e.body.into_value() },
      Err(err) => {
        let body = handle_error(&err);
        Self::Error { status: Some(err.status()), error: body }
      }
    }
  }

  pub fn status(&self) -> u16 {
    match self {
      Self::Success { status, .. } | Self::Failure { status, .. } | Self::Redirect { status, .. } => {
        *status
      }
      Self::Error { status, .. } => status.unwrap_or(500),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::control::{error, fail, redirect};

  #[test]
  fn success_omits_missing_data() {
    let json = serde_json::to_value(ActionResult::Success { status: 200, data: None }).unwrap();
    assert_eq!(json, serde_json::json!({ "type": "success", "status": 200 }));
  }

  #[test]
  fn failure_round_trips() {
    let wire = serde_json::json!({ "type": "failure", "status": 422, "data": { "missing": true } });
    let parsed: ActionResult = serde_json::from_value(wire.clone()).unwrap();
    assert_eq!(parsed.status(), 422);
    assert_eq!(serde_json::to_value(&parsed).unwrap(), wire);
  }

  #[test]
  fn error_without_status_defaults_to_500() {
    let parsed: ActionResult =
      serde_json::from_value(serde_json::json!({ "type": "error", "error": { "message": "x" } }))
        .unwrap();
    assert_eq!(parsed.status(), 500);
  }

  #[test]
  fn from_outcome_maps_each_variant() {
    let unused = |_: &LoadError| serde_json::json!({ "message": "unused" });

    let ok = ActionResult::from_outcome(Ok(serde_json::json!({ "id": 1 }).into()), unused);
    assert_eq!(ok, ActionResult::Success { status: 200, data: Some(serde_json::json!({ "id": 1 })) });

    let failed = ActionResult::from_outcome(Ok(fail(400, None).into()), unused);
    assert_eq!(failed, ActionResult::Failure { status: 400, data: None });

    let moved = ActionResult::from_outcome(Err(redirect(303, "/done").unwrap().into()), unused);
    assert_eq!(moved, ActionResult::Redirect { status: 303, location: "/done".into() });

    let http = ActionResult::from_outcome(Err(error(403, "no").unwrap().into()), unused);
    assert_eq!(
      http,
      ActionResult::Error { status: Some(403), error: serde_json::json!({ "message": "no" }) }
    );
  }

  #[test]
  fn from_outcome_routes_unexpected_through_hook() {
    let result = ActionResult::from_outcome(Err(LoadError::message("db down")), |_| {
      serde_json::json!({ "message": "Internal Error" })
    });
    assert_eq!(
      result,
      ActionResult::Error { status: Some(500), error: serde_json::json!({ "message": "Internal Error" }) }
    );
  }
}
