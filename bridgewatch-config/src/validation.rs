//! Semantic checks run after parsing.

use std::fmt;

use url::Url;

use crate::error::ConfigLoadError;
use crate::models::Config;

/// Suspicious but usable setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    /// Bridge or account the warning is about.
    pub scope: String,
    /// What looks wrong.
    pub message: String,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.message)
    }
}

/// Every warning of one validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigWarnings(Vec<ConfigWarning>);

impl ConfigWarnings {
    fn push(&mut self, scope: impl Into<String>, message: impl Into<String>) {
        self.0.push(ConfigWarning {
            scope: scope.into(),
            message: message.into(),
        });
    }

    /// No warnings.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of warnings.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Warnings in validation order.
    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.0.iter()
    }
}

fn require_positive(value: u64, scope: &str, field: &'static str) -> Result<(), ConfigLoadError> {
    if value == 0 {
        return Err(ConfigLoadError::ZeroDuration {
            scope: scope.to_owned(),
            field,
        });
    }
    Ok(())
}

fn require_url(url: &str, scope: &str) -> Result<(), ConfigLoadError> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|source| ConfigLoadError::InvalidUrl {
            scope: scope.to_owned(),
            url: url.to_owned(),
            source,
        })
}

/// Reject configurations that cannot run and collect the questionable bits.
pub fn validate(config: &Config) -> Result<ConfigWarnings, ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    for (bridge_id, bridge) in &config.bridges {
        let scope = format!("bridge {bridge_id}");
        let settings = &bridge.settings;
        require_positive(settings.max_ttl, &scope, "max_ttl")?;
        require_positive(settings.ttl_if_unreachable, &scope, "ttl_if_unreachable")?;
        require_positive(settings.alert_period, &scope, "alert_period")?;

        match &settings.status_endpoint_url {
            Some(url) => require_url(url, &scope)?,
            None => warnings.push(
                &scope,
                "no status_endpoint_url, only pushed status will be seen",
            ),
        }
        if settings.ttl_if_unreachable > settings.max_ttl {
            warnings.push(
                &scope,
                format!(
                    "ttl_if_unreachable ({}) exceeds max_ttl ({}) and has no effect",
                    settings.ttl_if_unreachable, settings.max_ttl
                ),
            );
        }
        if bridge.accounts.is_empty() {
            warnings.push(&scope, "no accounts configured");
        }
    }

    for (account_id, account) in &config.accounts {
        let scope = format!("account {account_id}");
        require_url(&account.homeserver, &scope)?;

        for (bridge_id, inactivity) in &account.watch.watched_bridges {
            let scope = format!("account {account_id}, bridge {bridge_id}");
            require_positive(inactivity.alert_after_inactivity, &scope, "alert_after_inactivity")?;
            require_positive(inactivity.alert_period, &scope, "alert_period")?;

            if let Some(probe) = &inactivity.liveness_probe
                && !config.accounts.contains_key(&probe.send_user)
            {
                return Err(ConfigLoadError::UnknownProbeSender {
                    account: account_id.clone(),
                    bridge: bridge_id.clone(),
                    sender: probe.send_user.clone(),
                });
            }
        }
    }

    if let Some(room) = &config.notify.room
        && !config.accounts.contains_key(&room.account_id)
    {
        return Err(ConfigLoadError::UnknownNotifyAccount(room.account_id.clone()));
    }

    Ok(warnings)
}
