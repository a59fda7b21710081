//! Runtime configuration, read once from the process environment.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use fpl_bucket::S3Config;
use sqlx::postgres::PgConnectOptions;

use crate::error::{PipelineError, Result};
use crate::pipelines::ProcessingPipeline;

pub const TABLE_NAME_VARS: [&str; 2] = ["PG_TABLE_NAME_GW", "PG_TABLE_NAME_FIXTURES"];

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub connect_timeout: Duration,
    pub statement_timeout: Duration,
}

impl PostgresConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
            .options([(
                "statement_timeout",
                self.statement_timeout.as_millis().to_string(),
            )])
    }
}

#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub operation_timeout: Duration,
}

impl ObjectStoreConfig {
    /// MinIO is addressed path-style; a bare `host:port` endpoint is taken as http.
    pub fn s3_config(&self) -> S3Config {
        let endpoint = if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            format!("http://{}", self.endpoint)
        };
        S3Config {
            region: self.region.clone(),
            endpoint: Some(endpoint),
            access_key_id: Some(self.access_key.clone()),
            secret_access_key: Some(self.secret_key.clone()),
            force_path_style: true,
            operation_timeout: Some(self.operation_timeout),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub postgres: PostgresConfig,
    pub object_store: ObjectStoreConfig,
    /// Configured destination table names, keyed by environment variable.
    pub destinations: BTreeMap<&'static str, String>,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| PipelineError::Config(format!("{key} must be set")))
        };
        let timeout_secs = |key: &str, default: u64| -> Result<Duration> {
            parse_or(lookup(key), key, default).map(Duration::from_secs)
        };

        let connect_timeout = timeout_secs("FPL_DB_TIMEOUT_SECS", 30)?;
        let postgres = PostgresConfig {
            host: required("PG_HOST")?,
            port: parse_or(lookup("PG_PORT"), "PG_PORT", 5432)?,
            database: required("PG_DATABASE")?,
            user: required("PG_USER")?,
            password: required("PG_PASSWORD")?,
            connect_timeout,
            statement_timeout: timeout_secs("FPL_STATEMENT_TIMEOUT_SECS", 300)?,
        };

        let object_store = ObjectStoreConfig {
            endpoint: required("MINIO_ENDPOINT")?,
            access_key: required("MINIO_ACCESS_KEY")?,
            secret_key: required("MINIO_SECRET_KEY")?,
            region: lookup("MINIO_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            operation_timeout: connect_timeout,
        };

        let destinations = TABLE_NAME_VARS
            .iter()
            .filter_map(|&key| lookup(key).map(|value| (key, value.trim().to_string())))
            .collect();

        Ok(Self {
            postgres,
            object_store,
            destinations,
        })
    }

    /// Fails unless the destination configured for `pipeline` is exactly the table the
    /// pipeline is pinned to.
    pub fn validate_destination(&self, pipeline: &dyn ProcessingPipeline) -> Result<()> {
        let var = pipeline.table_name_var();
        let expected = pipeline.table().name;
        match self.destinations.get(var) {
            None => Err(PipelineError::Config(format!(
                "{var} must be set to '{expected}'"
            ))),
            Some(configured) if configured != expected => Err(PipelineError::Config(format!(
                "{var} is '{configured}' but pipeline {} writes only to '{expected}'",
                pipeline.code_identifier()
            ))),
            Some(_) => Ok(()),
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| PipelineError::Config(format!("{key} must be a number, got '{value}'"))),
    }
}
