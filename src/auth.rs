//! Caller capability checks.
//!
//! The tracker does not authenticate anyone itself. An [`AuthGate`] reports whether the current
//! caller is signed in and with which role; mutations and manual triggers require [`Role::Admin`].

use crate::error::TrackerError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Admin,
	#[default]
	Viewer,
}

impl FromStr for Role {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"admin" => Ok(Role::Admin),
			"viewer" => Ok(Role::Viewer),
			other => Err(format!("unknown role '{other}', expected admin or viewer")),
		}
	}
}

/// Answer of an [`AuthGate`] for the current caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerCheck {
	pub allowed: bool,
	pub role: Role,
}

#[async_trait::async_trait]
pub trait AuthGate: Send + Sync {
	async fn check_caller(&self) -> CallerCheck;

	/// Any signed-in caller.
	async fn require_caller(&self) -> Result<Role, TrackerError> {
		let check = self.check_caller().await;
		if !check.allowed {
			return Err(TrackerError::Unauthorized);
		}
		Ok(check.role)
	}

	/// A signed-in admin; `operation` names what was attempted in the error.
	async fn require_admin(&self, operation: &'static str) -> Result<(), TrackerError> {
		match self.require_caller().await? {
			Role::Admin => Ok(()),
			Role::Viewer => Err(TrackerError::Forbidden(operation)),
		}
	}
}

/// Gate with a fixed answer, used by the CLI and in tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticAuthGate(CallerCheck);

impl StaticAuthGate {
	pub fn new(role: Role) -> Self {
		Self(CallerCheck {
			allowed: true,
			role,
		})
	}

	pub fn anonymous() -> Self {
		Self(CallerCheck {
			allowed: false,
			role: Role::Viewer,
		})
	}
}

#[async_trait::async_trait]
impl AuthGate for StaticAuthGate {
	async fn check_caller(&self) -> CallerCheck {
		self.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn viewers_cannot_mutate() {
		let gate = StaticAuthGate::new(Role::Viewer);
		assert_eq!(gate.require_caller().await.unwrap(), Role::Viewer);
		assert!(matches!(
			gate.require_admin("add wallet").await,
			Err(TrackerError::Forbidden("add wallet"))
		));
	}

	#[tokio::test]
	async fn anonymous_callers_are_rejected() {
		let gate = StaticAuthGate::anonymous();
		assert!(matches!(
			gate.require_caller().await,
			Err(TrackerError::Unauthorized)
		));
		assert!(matches!(
			gate.require_admin("sync").await,
			Err(TrackerError::Unauthorized)
		));
	}

	#[tokio::test]
	async fn admins_pass() {
		assert!(StaticAuthGate::new(Role::Admin).require_admin("sync").await.is_ok());
		assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
	}
}
