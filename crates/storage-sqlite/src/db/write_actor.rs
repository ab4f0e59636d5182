//! Single writer for SQLite. Every write runs on one dedicated connection,
//! inside a transaction, in submission order.

use std::any::Any;

use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use log::error;
use tokio::sync::{mpsc, oneshot};

use carematch_core::errors::{DatabaseError, Error, Result};

use super::DbPool;

type Reply = Result<Box<dyn Any + Send>>;
type Job = Box<dyn FnOnce(&mut SqliteConnection) -> Reply + Send>;

/// Rolls the transaction back for either kind of failure.
enum TxError {
    Diesel(diesel::result::Error),
    App(Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

impl From<TxError> for Error {
    fn from(err: TxError) -> Self {
        match err {
            TxError::Diesel(e) => Error::Database(DatabaseError::QueryFailed(e.to_string())),
            TxError::App(e) => e,
        }
    }
}

#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<(Job, oneshot::Sender<Reply>)>,
}

impl WriteHandle {
    /// Runs `job` on the writer connection and waits for its result.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let boxed: Job = Box::new(move |conn| {
            job(conn).map(|value| Box::new(value) as Box<dyn Any + Send>)
        });
        self.tx.send((boxed, reply_tx)).map_err(|_| {
            Error::Database(DatabaseError::Internal("writer has shut down".to_string()))
        })?;

        let value = reply_rx.await.map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "writer dropped the reply".to_string(),
            ))
        })??;
        value.downcast::<T>().map(|value| *value).map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "writer returned an unexpected type".to_string(),
            ))
        })
    }
}

/// Starts the writer thread. It stops once every handle is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<(Job, oneshot::Sender<Reply>)>();

    std::thread::spawn(move || {
        let mut conn = None;
        while let Some((job, reply)) = rx.blocking_recv() {
            if conn.is_none() {
                match pool.get() {
                    Ok(c) => conn = Some(c),
                    Err(e) => {
                        error!("Writer could not get a connection: {}", e);
                        let _ = reply.send(Err(Error::Database(DatabaseError::ConnectionFailed(
                            e.to_string(),
                        ))));
                        continue;
                    }
                }
            }
            let Some(pooled) = conn.as_mut() else {
                continue;
            };
            let sqlite: &mut SqliteConnection = &mut *pooled;

            let result = sqlite
                .transaction::<_, TxError, _>(|tx_conn| job(tx_conn).map_err(TxError::App))
                .map_err(Error::from);
            let _ = reply.send(result);
        }
    });

    WriteHandle { tx }
}
