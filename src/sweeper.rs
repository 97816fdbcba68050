//! Periodic removal of accounts that never verified their email.

use std::sync::Arc;
use std::time::Duration;

use actix::prelude::*;
use chrono::Utc;
use log::{debug, error, info};

use crate::admin::removal_plan;
use crate::error::AppResult;
use crate::store::Store;

pub struct StaleAccountSweeper {
    store: Arc<dyn Store>,
    max_age: chrono::Duration,
    interval: Duration,
}

impl StaleAccountSweeper {
    pub fn new(store: Arc<dyn Store>, max_age_days: i64, interval: Duration) -> Self {
        StaleAccountSweeper {
            store,
            max_age: chrono::Duration::days(max_age_days),
            interval,
        }
    }
}

/// Deletes unverified users older than `max_age` with their profiles and
/// manager links. Accounts on active projects are kept.
/// Returns how many accounts were removed.
pub async fn sweep_stale_accounts(store: &dyn Store, max_age: chrono::Duration) -> AppResult<usize> {
    let cutoff = Utc::now() - max_age;
    let stale = store.stale_unverified_users(cutoff).await?;
    let mut removed = 0;
    for user in stale {
        if !user.active_projects.is_empty() {
            debug!("Keeping unverified account {}: it has active projects", user.id);
            continue;
        }
        let result = match removal_plan(store, &user).await {
            Ok(mutations) => store.apply(mutations).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => error!("Failed to remove stale account {}: {}", user.id, e),
        }
    }
    Ok(removed)
}

#[derive(Message)]
#[rtype(result = "()")]
struct Sweep;

impl Actor for StaleAccountSweeper {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Context<Self>) {
        info!("Stale account sweep every {:?}", self.interval);
        ctx.run_interval(self.interval, |_, ctx| ctx.notify(Sweep));
    }
}

impl Handler<Sweep> for StaleAccountSweeper {
    type Result = ();

    fn handle(&mut self, _: Sweep, ctx: &mut Context<Self>) {
        let store = self.store.clone();
        let max_age = self.max_age;
        ctx.spawn(
            async move {
                match sweep_stale_accounts(store.as_ref(), max_age).await {
                    Ok(0) => {}
                    Ok(n) => info!("Removed {} unverified accounts", n),
                    Err(e) => error!("Stale account sweep failed: {}", e),
                }
            }
            .into_actor(self),
        );
    }
}
