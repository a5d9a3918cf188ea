//! CK-005: Notifications, pending cross-resource effects.
//!
//! A notification records which recipe it belongs to, the action to trigger,
//! a `type[name]` descriptor of the target, and when to fire. Timing is
//! validated at construction; the target is looked up on demand by scanning
//! the owning recipe's children in declaration order.

use super::error::NotificationError;
use super::types::{RecipeGraph, RecipeId, Resource};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static DESCRIPTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^\[]+)\[([^\]]+)\]$").expect("descriptor grammar is a valid regex")
});

/// When a notified action fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// Batched until the end of the run. Same as [`Timing::Delayed`].
    Delay,
    /// Batched until the end of the run.
    Delayed,
    /// Right after the notifying resource.
    Immediately,
}

impl Timing {
    pub fn parse(token: &str) -> Result<Self, NotificationError> {
        match token {
            "delay" => Ok(Self::Delay),
            "delayed" => Ok(Self::Delayed),
            "immediately" => Ok(Self::Immediately),
            other => Err(NotificationError::InvalidTiming(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delay => "delay",
            Self::Delayed => "delayed",
            Self::Immediately => "immediately",
        }
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared `notifies` edge, resolved lazily.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    #[serde(skip)]
    recipe: RecipeId,
    action: String,
    #[serde(rename = "resource")]
    target_resource_desc: String,
    timing: Timing,
}

impl Notification {
    /// Build a notification, terminating the process on an invalid timing.
    ///
    /// Invalid timing is a configuration error that is not recoverable at
    /// apply time, so it is logged and the process exits with status 1.
    /// Use [`Notification::try_new`] to get the error instead.
    pub fn create(
        recipe: RecipeId,
        action: impl Into<String>,
        target_resource_desc: impl Into<String>,
        timing: &str,
    ) -> Self {
        match Self::try_new(recipe, action, target_resource_desc, timing) {
            Ok(n) => n,
            Err(e) => {
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        }
    }

    /// Build a notification, returning [`NotificationError::InvalidTiming`]
    /// for an unknown timing token.
    pub fn try_new(
        recipe: RecipeId,
        action: impl Into<String>,
        target_resource_desc: impl Into<String>,
        timing: &str,
    ) -> Result<Self, NotificationError> {
        Ok(Self {
            recipe,
            action: action.into(),
            target_resource_desc: target_resource_desc.into(),
            timing: Timing::parse(timing)?,
        })
    }

    pub fn recipe(&self) -> RecipeId {
        self.recipe
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn target_resource_desc(&self) -> &str {
        &self.target_resource_desc
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn is_delayed(&self) -> bool {
        matches!(self.timing, Timing::Delay | Timing::Delayed)
    }

    pub fn is_immediately(&self) -> bool {
        self.timing == Timing::Immediately
    }

    /// Find the target in the owning recipe. First match in declaration
    /// order wins.
    pub fn resource<'g>(&self, graph: &'g RecipeGraph) -> Result<&'g Resource, NotificationError> {
        let (kind, name) = parse_description(&self.target_resource_desc)?;
        graph
            .recipe(self.recipe)
            .resources()
            .find(|r| r.resource_type().keyword() == kind && r.resource_name() == name)
            .ok_or_else(|| NotificationError::NotFound(self.target_resource_desc.clone()))
    }
}

/// Split `type[name]` into its parts.
pub fn parse_description(desc: &str) -> Result<(&str, &str), NotificationError> {
    let caps = DESCRIPTOR
        .captures(desc)
        .ok_or_else(|| NotificationError::Parse(desc.to_string()))?;
    match (caps.get(1), caps.get(2)) {
        (Some(kind), Some(name)) => Ok((kind.as_str(), name.as_str())),
        _ => Err(NotificationError::Parse(desc.to_string())),
    }
}
