//! Database connection pool, migrations and the unit of work.
//!
//! This module provides utilities for:
//! - Creating and managing a PostgreSQL connection pool
//! - Running database migrations automatically
//! - Running multi-row writes in one transaction with jobs deferred until commit

use sqlx::{PgConnection, Pool, Postgres, Transaction};

use crate::error::AppError;
use crate::jobs::{EnqueueOptions, Job, JobDispatcher};

/// Type alias for PostgreSQL connection pool.
pub type DbPool = Pool<Postgres>;

/// Create a new PostgreSQL connection pool.
///
/// A connection pool maintains multiple database connections that can be reused across HTTP requests which is much more efficient than opening a new connection for each request.
///
/// # Errors
///
/// Returns an error if:
/// - Database connection string is invalid
/// - Cannot connect to PostgreSQL server
/// - Database authentication fails
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Run database migrations from the `migrations/` directory.
///
/// Migrations are tracked in the `_sqlx_migrations` table, so each migration runs only once.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    // The macro reads migrations at compile time from ./migrations directory
    sqlx::migrate!("./migrations").run(pool).await
}

/// A database transaction plus the jobs to enqueue once it commits.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] rolls the
/// transaction back and discards the deferred jobs.
pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
    after_commit: Vec<(Job, EnqueueOptions)>,
}

impl UnitOfWork {
    /// Start a transaction.
    pub async fn begin(pool: &DbPool) -> Result<Self, AppError> {
        Ok(Self {
            tx: pool.begin().await?,
            after_commit: Vec::new(),
        })
    }

    /// Connection to run statements on inside this transaction.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Queue a job to be enqueued after a successful commit.
    pub fn defer(&mut self, job: Job, options: EnqueueOptions) {
        self.after_commit.push((job, options));
    }

    pub fn deferred(&self) -> &[(Job, EnqueueOptions)] {
        &self.after_commit
    }

    /// Commit, then enqueue deferred jobs.
    ///
    /// Enqueue failures are logged and swallowed: a committed order must not be
    /// reported as failed because a background job could not be scheduled.
    pub async fn commit(self, jobs: &dyn JobDispatcher) -> Result<(), AppError> {
        self.tx.commit().await?;

        for (job, options) in self.after_commit {
            if let Err(e) = jobs.enqueue(job.clone(), options).await {
                tracing::error!(job = ?job, error = %e, "Failed to enqueue post-commit job");
            }
        }

        Ok(())
    }

    pub async fn rollback(self) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
