//! Reconciliation of declared read access against live grants
//!
//! One unit is a `(product, stage, interface)` triple. Each attempt:
//!
//! 1. evaluates the interface's object matcher for the stage
//! 2. ensures the unit's database role exists in every database it reaches
//! 3. fetches live grants and computes a [`GrantDelta`] per database
//! 4. executes role creation, future grants, grants and finally revokes,
//!    each phase in batches of `batch_size` statements
//!
//! A drift error anywhere invalidates the affected part of the cache and
//! restarts the unit with exponential backoff, up to `max_attempts`.

use super::delta::{DesiredGrants, GrantDelta};
use super::{AccountRole, DatabaseRole, Mode};
use crate::backend::{target_of, Platform, Session, Statement};
use crate::cache::AccountCache;
use crate::config::Config;
use crate::declaration::{Grupin, Interface, Product};
use crate::error::{GrupinError, Result};
use crate::matcher::ObjMatcher;
use crate::matching::{MatchedObjects, MatchingEngine};
use crate::usage::{write_usage, UsageRecord};
use crate::validation::Identifier;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One reconciliation unit
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ReconcileUnit {
    pub product: Identifier,
    pub dtap: Identifier,
    /// `None` for the product-level interface
    pub interface: Option<Identifier>,
}

impl fmt::Display for ReconcileUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.product, self.dtap)?;
        if let Some(i) = &self.interface {
            write!(f, "/{}", i)?;
        }
        Ok(())
    }
}

/// Result of reconciling one unit
#[derive(Debug)]
pub struct UnitOutcome {
    pub unit: ReconcileUnit,
    pub attempts: u32,
    /// Grant statements executed, over all attempts
    pub granted: usize,
    /// Revoke statements executed, over all attempts
    pub revoked: usize,
    pub result: Result<()>,
}

impl UnitOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-unit outcomes of a reconciliation run, ordered by unit
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub outcomes: Vec<UnitOutcome>,
}

impl ReconcileReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(UnitOutcome::is_success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn outcome(&self, unit: &ReconcileUnit) -> Option<&UnitOutcome> {
        self.outcomes.iter().find(|o| &o.unit == unit)
    }

    pub fn granted(&self) -> usize {
        self.outcomes.iter().map(|o| o.granted).sum()
    }

    pub fn revoked(&self) -> usize {
        self.outcomes.iter().map(|o| o.revoked).sum()
    }
}

/// Statements for one attempt, in execution order
#[derive(Debug, Default)]
struct Plan {
    create: Vec<Statement>,
    future: Vec<Statement>,
    grant: Vec<Statement>,
    revoke: Vec<Statement>,
}

impl Plan {
    fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.future.is_empty()
            && self.grant.is_empty()
            && self.revoke.is_empty()
    }

    fn add_delta(&mut self, delta: GrantDelta) {
        self.future
            .extend(delta.grant_future.into_iter().map(Statement::GrantFuture));
        self.grant.extend(delta.grant.into_iter().map(Statement::Grant));
        self.revoke.extend(delta.revoke.into_iter().map(Statement::Revoke));
        self.revoke
            .extend(delta.revoke_future.into_iter().map(Statement::RevokeFuture));
    }
}

#[derive(Debug, Default)]
struct Executed {
    granted: usize,
    revoked: usize,
}

/// Drives units against a shared cache and platform session
pub struct Reconciler {
    config: Config,
    engine: MatchingEngine,
    session: Session,
    /// Last matched objects per unit, so the next run refreshes what it saw
    previous: Mutex<HashMap<ReconcileUnit, MatchedObjects>>,
}

impl Reconciler {
    pub fn new(config: Config, session: Session) -> Self {
        Self::with_cache(config, session, Arc::new(AccountCache::new()))
    }

    /// Share an existing cache, e.g. between a reconciler and ad-hoc queries.
    pub fn with_cache(config: Config, session: Session, cache: Arc<AccountCache>) -> Self {
        Reconciler {
            config,
            engine: MatchingEngine::new(cache),
            session,
            previous: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &MatchingEngine {
        &self.engine
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Every `(product, stage, interface)` of a declaration, in order.
    pub fn units(grupin: &Grupin) -> Vec<ReconcileUnit> {
        let mut units = Vec::new();
        for product in grupin.products.values() {
            for dtap in product.dtaps.all() {
                for interface in product.all_interfaces() {
                    units.push(ReconcileUnit {
                        product: product.id.clone(),
                        dtap: dtap.clone(),
                        interface: interface.id.clone(),
                    });
                }
            }
        }
        units
    }

    /// Reconcile every unit on the worker pool. A failing unit never stops
    /// the others.
    pub fn reconcile_all(&self, grupin: &Grupin) -> Result<ReconcileReport> {
        let units = Self::units(grupin);
        let workers = self.config.workers.clamp(1, units.len().max(1));

        let (unit_tx, unit_rx) = crossbeam::channel::unbounded();
        for unit in units {
            if unit_tx.send(unit).is_err() {
                break;
            }
        }
        drop(unit_tx);

        let (outcome_tx, outcome_rx) = crossbeam::channel::unbounded();
        crossbeam::scope(|s| {
            for _ in 0..workers {
                let unit_rx = unit_rx.clone();
                let outcome_tx = outcome_tx.clone();
                s.spawn(move |_| {
                    for unit in unit_rx.iter() {
                        let outcome = self.reconcile_unit(grupin, &unit);
                        if outcome_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
        })
        .map_err(|_| GrupinError::Backend("reconciliation worker panicked".to_string()))?;
        drop(outcome_tx);

        let mut outcomes: Vec<UnitOutcome> = outcome_rx.iter().collect();
        outcomes.sort_by(|a, b| a.unit.cmp(&b.unit));

        let report = ReconcileReport { outcomes };
        info!(
            units = report.outcomes.len(),
            failed = report.failed().count(),
            granted = report.granted(),
            revoked = report.revoked(),
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Reconcile one unit, retrying on drift.
    pub fn reconcile_unit(&self, grupin: &Grupin, unit: &ReconcileUnit) -> UnitOutcome {
        let mut outcome = UnitOutcome {
            unit: unit.clone(),
            attempts: 0,
            granted: 0,
            revoked: 0,
            result: Ok(()),
        };

        let (product, interface) = match resolve(grupin, unit) {
            Ok(found) => found,
            Err(e) => {
                outcome.result = Err(e);
                return outcome;
            }
        };
        let matcher = interface.objects.for_dtap(unit.dtap.as_str());
        let mut previous = self.previous.lock().get(unit).cloned();

        loop {
            outcome.attempts += 1;
            let mut executed = Executed::default();
            let result = self.attempt(
                grupin,
                product,
                unit,
                &matcher,
                &mut previous,
                &mut executed,
            );
            outcome.granted += executed.granted;
            outcome.revoked += executed.revoked;

            match result {
                Ok(()) => {
                    if let Some(matched) = previous {
                        self.previous.lock().insert(unit.clone(), matched);
                    }
                    info!(
                        unit = %unit,
                        attempts = outcome.attempts,
                        granted = outcome.granted,
                        revoked = outcome.revoked,
                        "unit reconciled"
                    );
                    return outcome;
                }
                Err(e) if e.is_retryable() && outcome.attempts < self.config.max_attempts => {
                    let delay = self.config.backoff(outcome.attempts);
                    warn!(
                        unit = %unit,
                        attempt = outcome.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "drift detected, retrying"
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => {
                    let e = if e.is_retryable() {
                        GrupinError::RetriesExhausted {
                            unit: unit.to_string(),
                            attempts: outcome.attempts,
                            last: Box::new(e),
                        }
                    } else {
                        e
                    };
                    warn!(unit = %unit, attempts = outcome.attempts, error = %e, "unit failed");
                    outcome.result = Err(e);
                    return outcome;
                }
            }
        }
    }

    fn attempt(
        &self,
        grupin: &Grupin,
        product: &Product,
        unit: &ReconcileUnit,
        matcher: &ObjMatcher,
        previous: &mut Option<MatchedObjects>,
        executed: &mut Executed,
    ) -> Result<()> {
        let matched = self.engine.evaluate(&self.session, matcher, previous.as_ref())?;
        let plan = self.plan(grupin, product, unit, matcher, &matched)?;
        *previous = Some(matched);

        if !plan.is_empty() {
            debug!(
                unit = %unit,
                create = plan.create.len(),
                future = plan.future.len(),
                grant = plan.grant.len(),
                revoke = plan.revoke.len(),
                "applying plan"
            );
        }
        // Access is added before anything is taken away
        for phase in [plan.create, plan.future, plan.grant, plan.revoke] {
            self.execute(&phase, executed)?;
        }

        if let (Some(table), Some(matched)) = (&self.config.usage_table, previous.as_ref()) {
            let records = UsageRecord::from_matched(
                &unit.product,
                unit.interface.as_ref(),
                unit.dtap.as_str(),
                matcher,
                matched,
                Utc::now(),
            );
            if let Err(e) = write_usage(&self.session, table, &records, self.config.batch_size) {
                if matches!(e, GrupinError::Cancelled) {
                    return Err(e);
                }
                warn!(unit = %unit, error = %e, "failed to write usage records");
            }
        }
        Ok(())
    }

    fn plan(
        &self,
        grupin: &Grupin,
        product: &Product,
        unit: &ReconcileUnit,
        matcher: &ObjMatcher,
        matched: &MatchedObjects,
    ) -> Result<Plan> {
        let naming = &self.config.naming;
        let mut plan = Plan::default();
        let grantees = self.desired_grantees(grupin, product, unit);
        let mut account_roles = BTreeSet::new();

        for database in self.candidate_databases(matcher, matched)? {
            let role = DatabaseRole {
                database: database.clone(),
                product: unit.product.clone(),
                dtap: unit.dtap.clone(),
                interface: unit.interface.clone(),
                mode: Mode::Read,
            };
            let name = naming.database_role_name(&role);
            let desired = DesiredGrants::compute(&name, &database, Mode::Read, matcher, matched);

            let exists = self
                .drift_scope(&database, self.session.database_roles(&database))?
                .map(|r| r.map(|n| n.eq_ignore_ascii_case(&name)))
                .collect::<Result<Vec<bool>>>()?
                .contains(&true);

            if !exists && desired.grants.is_empty() {
                continue;
            }

            let (live, live_future, live_grantees) = if exists {
                (
                    self.drift_scope(
                        &database,
                        self.session.grants_to_database_role(&database, &name),
                    )?
                    .collect::<Result<Vec<_>>>()?,
                    self.drift_scope(
                        &database,
                        self.session.future_grants_to_database_role(&database, &name),
                    )?
                    .collect::<Result<Vec<_>>>()?,
                    self.drift_scope(
                        &database,
                        self.session.grants_of_database_role(&database, &name),
                    )?
                    .collect::<Result<Vec<String>>>()?,
                )
            } else {
                plan.create.push(Statement::CreateDatabaseRole {
                    database: database.clone(),
                    role: name.clone(),
                });
                (Vec::new(), Vec::new(), Vec::new())
            };

            let delta =
                GrantDelta::compute(&desired, &live, &live_future, Mode::Read, &database, matcher);
            debug!(
                role = %naming.render_database_role(&role),
                satisfied = delta.satisfied,
                untouched = delta.untouched,
                grant = delta.granted(),
                revoke = delta.revoked(),
                "grant delta"
            );
            plan.add_delta(delta);

            // Role-to-role grants only matter while the role grants anything
            let wanted: &[String] = if desired.grants.is_empty() { &[] } else { &grantees };
            for to in wanted {
                if !live_grantees.iter().any(|g| g.eq_ignore_ascii_case(to)) {
                    account_roles.insert(to.clone());
                    plan.grant.push(Statement::GrantDatabaseRole {
                        database: database.clone(),
                        role: name.clone(),
                        to: to.clone(),
                    });
                }
            }
            for held in &live_grantees {
                let keep = wanted.iter().any(|g| g.eq_ignore_ascii_case(held));
                if !keep && naming.is_managed_account_role(held) {
                    plan.revoke.push(Statement::RevokeDatabaseRole {
                        database: database.clone(),
                        role: name.clone(),
                        from: held.clone(),
                    });
                }
            }
        }

        plan.create.extend(
            account_roles
                .into_iter()
                .map(|role| Statement::CreateAccountRole { role }),
        );
        Ok(plan)
    }

    /// Databases the unit may hold a role in: everything matched, plus
    /// databases its includes name where nothing matched (any role left
    /// there gets its grants revoked).
    fn candidate_databases(
        &self,
        matcher: &ObjMatcher,
        matched: &MatchedObjects,
    ) -> Result<BTreeSet<String>> {
        let mut databases: BTreeSet<String> =
            matched.databases().into_iter().map(str::to_string).collect();
        let listing = self.engine.cache().databases(&self.session, None)?;
        for name in listing.entries.keys() {
            let named = matcher
                .include()
                .keys()
                .any(|inc| inc.database().matches(name));
            if named {
                databases.insert(name.clone());
            }
        }
        Ok(databases)
    }

    /// Account roles a unit's database role should be granted to: every
    /// consumer of the interface deployed at the same stage, and the
    /// product's own account role for the product-level interface.
    fn desired_grantees(
        &self,
        grupin: &Grupin,
        product: &Product,
        unit: &ReconcileUnit,
    ) -> Vec<String> {
        let naming = &self.config.naming;
        let account_role = |p: &Product| {
            naming.account_role_name(&AccountRole {
                product: p.id.clone(),
                dtap: unit.dtap.clone(),
                mode: Mode::Read,
            })
        };

        let mut out = BTreeSet::new();
        if unit.interface.is_none() {
            out.insert(account_role(product));
        }
        let interface = unit.interface.as_ref().map(Identifier::as_str);
        for consumer in grupin.consumers_of(product.id.as_str(), interface) {
            if consumer.dtaps.contains(unit.dtap.as_str()) {
                out.insert(account_role(consumer));
            }
        }
        out.into_iter().collect()
    }

    /// On drift while inspecting a database, mark it (and the account
    /// listing) stale before handing the error back.
    fn drift_scope<T>(&self, database: &str, result: Result<T>) -> Result<T> {
        result.map_err(|e| {
            if e.is_retryable() {
                self.invalidate_database(database);
            }
            e
        })
    }

    fn invalidate_database(&self, database: &str) {
        let cache = self.engine.cache();
        cache.invalidate();
        if let Some(db) = cache.database(database) {
            db.invalidate_subtree();
        }
    }

    fn execute(&self, statements: &[Statement], executed: &mut Executed) -> Result<()> {
        for batch in statements.chunks(self.config.batch_size.max(1)) {
            if let Err(e) = self.session.execute(batch) {
                if e.is_retryable() {
                    let databases: BTreeSet<String> = batch
                        .iter()
                        .filter_map(target_of)
                        .map(|path| path.database)
                        .collect();
                    debug!(?databases, error = %e, "batch hit drift");
                    for database in &databases {
                        self.invalidate_database(database);
                    }
                }
                return Err(e);
            }
            executed.granted += batch.iter().filter(|s| s.is_grant()).count();
            executed.revoked += batch.iter().filter(|s| s.is_revoke()).count();
        }
        Ok(())
    }
}

fn resolve<'g>(grupin: &'g Grupin, unit: &ReconcileUnit) -> Result<(&'g Product, &'g Interface)> {
    let product = grupin
        .product(unit.product.as_str())
        .ok_or_else(|| GrupinError::UnknownProduct(unit.product.to_string()))?;
    let interface = product
        .interface(unit.interface.as_ref().map(Identifier::as_str))
        .ok_or_else(|| GrupinError::UnknownInterface {
            product: unit.product.to_string(),
            interface: unit
                .interface
                .as_ref()
                .map(Identifier::to_string)
                .unwrap_or_default(),
        })?;
    if !product.dtaps.contains(unit.dtap.as_str()) {
        return Err(GrupinError::InvalidDeclaration(format!(
            "product '{}' is not deployed at stage '{}'",
            unit.product, unit.dtap
        )));
    }
    Ok((product, interface))
}
