//! Device and scenario registry using SQLite.
//!
//! Scenarios are keyed by (hub_id, name). Their conditions and actions are
//! child rows removed with the scenario by `ON DELETE CASCADE`.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard};

use super::RegistryError;
use crate::event::{DeviceAction, DeviceType, Scenario, ScenarioCondition};

/// Persists devices and scenarios per hub.
pub struct SqliteHubRegistry {
    conn: Mutex<Connection>,
}

impl SqliteHubRegistry {
    /// Opens (or creates) the SQLite database and ensures the tables exist.
    pub fn new(db_path: &str) -> Result<Self, RegistryError> {
        let conn = Connection::open(db_path)?;
        let registry = Self {
            conn: Mutex::new(conn),
        };
        registry.create_tables()?;
        Ok(registry)
    }

    pub fn in_memory() -> Result<Self, RegistryError> {
        Self::new(":memory:")
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RegistryError> {
        self.conn.lock().map_err(|_| RegistryError::LockPoisoned)
    }

    fn create_tables(&self) -> Result<(), RegistryError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS sensors (
                id          TEXT NOT NULL,
                hub_id      TEXT NOT NULL,
                device_type TEXT NOT NULL,
                PRIMARY KEY (id, hub_id)
            );
            CREATE TABLE IF NOT EXISTS scenarios (
                id     INTEGER PRIMARY KEY AUTOINCREMENT,
                hub_id TEXT NOT NULL,
                name   TEXT NOT NULL,
                UNIQUE (hub_id, name)
            );
            CREATE TABLE IF NOT EXISTS conditions (
                scenario_id INTEGER NOT NULL REFERENCES scenarios(id) ON DELETE CASCADE,
                position    INTEGER NOT NULL,
                sensor_id   TEXT NOT NULL,
                type        TEXT NOT NULL,
                operation   TEXT NOT NULL,
                value       INTEGER,
                PRIMARY KEY (scenario_id, position)
            );
            CREATE TABLE IF NOT EXISTS actions (
                scenario_id INTEGER NOT NULL REFERENCES scenarios(id) ON DELETE CASCADE,
                position    INTEGER NOT NULL,
                sensor_id   TEXT NOT NULL,
                type        TEXT NOT NULL,
                value       INTEGER,
                PRIMARY KEY (scenario_id, position)
            );",
        )?;
        Ok(())
    }

    /// Registers a device, replacing its type if it is already known.
    pub fn add_device(
        &self,
        hub_id: &str,
        sensor_id: &str,
        device_type: DeviceType,
    ) -> Result<(), RegistryError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sensors (id, hub_id, device_type) VALUES (?1, ?2, ?3)
             ON CONFLICT (id, hub_id) DO UPDATE SET device_type = excluded.device_type",
            params![sensor_id, hub_id, device_type.as_str()],
        )?;
        Ok(())
    }

    /// Deletes a device. Returns whether a row existed.
    pub fn remove_device(&self, hub_id: &str, sensor_id: &str) -> Result<bool, RegistryError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM sensors WHERE id = ?1 AND hub_id = ?2",
            params![sensor_id, hub_id],
        )?;
        Ok(removed > 0)
    }

    pub fn device_exists(&self, hub_id: &str, sensor_id: &str) -> Result<bool, RegistryError> {
        let conn = self.lock()?;
        Ok(sensor_exists(&conn, hub_id, sensor_id)?)
    }

    /// Stores `scenario`, replacing any scenario of the same name on the hub.
    ///
    /// Every referenced sensor must already be registered on the hub;
    /// otherwise nothing is written.
    pub fn add_scenario(&self, scenario: &Scenario) -> Result<(), RegistryError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut missing: Vec<String> = Vec::new();
        for sensor_id in scenario.referenced_sensors() {
            if !sensor_exists(&tx, &scenario.hub_id, sensor_id)? {
                missing.push(sensor_id.to_string());
            }
        }
        if !missing.is_empty() {
            return Err(RegistryError::UnknownSensors {
                hub_id: scenario.hub_id.clone(),
                scenario: scenario.name.clone(),
                missing,
            });
        }

        tx.execute(
            "DELETE FROM scenarios WHERE hub_id = ?1 AND name = ?2",
            params![scenario.hub_id, scenario.name],
        )?;
        tx.execute(
            "INSERT INTO scenarios (hub_id, name) VALUES (?1, ?2)",
            params![scenario.hub_id, scenario.name],
        )?;
        let scenario_id = tx.last_insert_rowid();

        for (position, condition) in scenario.conditions.iter().enumerate() {
            tx.execute(
                "INSERT INTO conditions (scenario_id, position, sensor_id, type, operation, value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    scenario_id,
                    position as i64,
                    condition.sensor_id,
                    condition.condition_type.as_str(),
                    condition.operation.as_str(),
                    condition.value,
                ],
            )?;
        }
        for (position, action) in scenario.actions.iter().enumerate() {
            tx.execute(
                "INSERT INTO actions (scenario_id, position, sensor_id, type, value)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    scenario_id,
                    position as i64,
                    action.sensor_id,
                    action.action_type.as_str(),
                    action.value,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Deletes a scenario and its conditions/actions. Returns whether it existed.
    pub fn remove_scenario(&self, hub_id: &str, name: &str) -> Result<bool, RegistryError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM scenarios WHERE hub_id = ?1 AND name = ?2",
            params![hub_id, name],
        )?;
        Ok(removed > 0)
    }

    pub fn scenario(&self, hub_id: &str, name: &str) -> Result<Option<Scenario>, RegistryError> {
        let conn = self.lock()?;
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM scenarios WHERE hub_id = ?1 AND name = ?2",
                params![hub_id, name],
                |row| row.get(0),
            )
            .optional()?;

        match id {
            Some(id) => Ok(Some(load_scenario(&conn, id, hub_id, name)?)),
            None => Ok(None),
        }
    }

    /// All scenarios of a hub ordered by name.
    pub fn scenarios_for_hub(&self, hub_id: &str) -> Result<Vec<Scenario>, RegistryError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name FROM scenarios WHERE hub_id = ?1 ORDER BY name ASC")?;
        let rows = stmt
            .query_map(params![hub_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name)| load_scenario(&conn, id, hub_id, &name))
            .collect()
    }
}

fn sensor_exists(conn: &Connection, hub_id: &str, sensor_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sensors WHERE id = ?1 AND hub_id = ?2)",
        params![sensor_id, hub_id],
        |row| row.get(0),
    )
}

fn load_scenario(
    conn: &Connection,
    scenario_id: i64,
    hub_id: &str,
    name: &str,
) -> Result<Scenario, RegistryError> {
    let mut stmt = conn.prepare(
        "SELECT sensor_id, type, operation, value FROM conditions
         WHERE scenario_id = ?1 ORDER BY position ASC",
    )?;
    let condition_rows = stmt
        .query_map(params![scenario_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i32>>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut conditions = Vec::with_capacity(condition_rows.len());
    for (sensor_id, condition_type, operation, value) in condition_rows {
        conditions.push(ScenarioCondition {
            sensor_id,
            condition_type: condition_type.parse()?,
            operation: operation.parse()?,
            value,
        });
    }

    let mut stmt = conn.prepare(
        "SELECT sensor_id, type, value FROM actions
         WHERE scenario_id = ?1 ORDER BY position ASC",
    )?;
    let action_rows = stmt
        .query_map(params![scenario_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i32>>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut actions = Vec::with_capacity(action_rows.len());
    for (sensor_id, action_type, value) in action_rows {
        actions.push(DeviceAction {
            sensor_id,
            action_type: action_type.parse()?,
            value,
        });
    }

    Ok(Scenario {
        hub_id: hub_id.to_string(),
        name: name.to_string(),
        conditions,
        actions,
    })
}
