// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::ascii;
use std::error::Error;
use std::fmt::Write as _;

use anyhow::Context;
use async_trait::async_trait;
use bytes::BytesMut;
use postgres_types::{Format, FromSql, IsNull, ToSql, Type, to_sql_checked};
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, Row, Transaction};
use tracing::{debug, error};

use crate::error::GatewayError;
use crate::gateway::{DatabaseError, ExecutionResult, Gateway};

/// A [`Gateway`] speaking the PostgreSQL wire protocol.
pub struct PostgresGateway {
    client: Client,
    _connection: JoinHandle<()>,
}

impl PostgresGateway {
    /// Connects to the database described by `config`.
    pub async fn connect(
        config: &tokio_postgres::Config,
    ) -> Result<PostgresGateway, anyhow::Error> {
        let (client, connection) = config
            .connect(NoTls)
            .await
            .context("connecting to database")?;
        let handle = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("database connection error: {}", e);
            }
        });
        Ok(PostgresGateway {
            client,
            _connection: handle,
        })
    }
}

#[async_trait]
impl Gateway for PostgresGateway {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[String],
    ) -> Result<ExecutionResult, GatewayError> {
        let txn = match self.client.transaction().await {
            Ok(txn) => txn,
            Err(e) => return classify(e),
        };
        match query_first_row(&txn, sql, params).await {
            Ok(columns) => match txn.commit().await {
                Ok(()) => Ok(ExecutionResult::Success(columns)),
                Err(e) => classify(e),
            },
            Err(failure) => {
                debug!("rolling back: {}", sql);
                let rollback = txn.rollback().await;
                let res = match failure {
                    Failure::Postgres(e) => classify(e),
                    Failure::Gateway(e) => Err(e),
                };
                match rollback {
                    Err(e) if e.is_closed() => Err(GatewayError::Closed(e)),
                    _ => res,
                }
            }
        }
    }
}

enum Failure {
    Postgres(tokio_postgres::Error),
    Gateway(GatewayError),
}

impl From<tokio_postgres::Error> for Failure {
    fn from(e: tokio_postgres::Error) -> Failure {
        Failure::Postgres(e)
    }
}

async fn query_first_row(
    txn: &Transaction<'_>,
    sql: &str,
    params: &[String],
) -> Result<Vec<(String, String)>, Failure> {
    let stmt = txn.prepare(sql).await?;
    let params: Vec<_> = params.iter().map(|p| TextParam(p)).collect();
    let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
    let rows = txn.query(&stmt, &refs).await?;
    match rows.first() {
        Some(row) => decode_row(row).map_err(Failure::Gateway),
        None => Ok(vec![]),
    }
}

/// Turns an error into a database error when the server reported it.
fn classify(e: tokio_postgres::Error) -> Result<ExecutionResult, GatewayError> {
    if let Some(db) = e.as_db_error() {
        return Ok(ExecutionResult::DatabaseError(DatabaseError {
            message: db.message().to_string(),
            legacy_code: None,
            engine_code: db.code().code().to_string(),
        }));
    }
    if e.is_closed() {
        Err(GatewayError::Closed(e))
    } else {
        Err(GatewayError::Client(e))
    }
}

/// A parameter sent in the text format, leaving the conversion to the
/// parameter's type to the server.
#[derive(Debug)]
struct TextParam<'a>(&'a str);

impl ToSql for TextParam<'_> {
    fn to_sql(&self, _: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        out.extend_from_slice(self.0.as_bytes());
        Ok(IsNull::No)
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    fn encode_format(&self, _: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

/// Renders each column of `row` as text. Column names are uppercased.
fn decode_row(row: &Row) -> Result<Vec<(String, String)>, GatewayError> {
    let mut out = Vec::with_capacity(row.len());
    for (i, col) in row.columns().iter().enumerate() {
        let decode_err = |e: tokio_postgres::Error| GatewayError::Decode {
            column: col.name().to_string(),
            message: e.to_string(),
        };
        let ty = col.type_();
        let value: Option<String> = match *ty {
            Type::BOOL => row.try_get::<_, Option<bool>>(i).map(|x| x.map(|x| x.to_string())),
            Type::CHAR => row.try_get::<_, Option<i8>>(i).map(|x| x.map(|x| x.to_string())),
            Type::INT2 => row.try_get::<_, Option<i16>>(i).map(|x| x.map(|x| x.to_string())),
            Type::INT4 => row.try_get::<_, Option<i32>>(i).map(|x| x.map(|x| x.to_string())),
            Type::INT8 => row.try_get::<_, Option<i64>>(i).map(|x| x.map(|x| x.to_string())),
            Type::OID => row.try_get::<_, Option<u32>>(i).map(|x| x.map(|x| x.to_string())),
            Type::FLOAT4 => row.try_get::<_, Option<f32>>(i).map(|x| x.map(|x| x.to_string())),
            Type::FLOAT8 => row.try_get::<_, Option<f64>>(i).map(|x| x.map(|x| x.to_string())),
            Type::NUMERIC => row.try_get::<_, Option<Numeric>>(i).map(|x| x.map(|x| x.0)),
            Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(i).map(|x| {
                x.map(|x| x.into_iter().flat_map(ascii::escape_default).map(char::from).collect())
            }),
            Type::TIMESTAMP => row
                .try_get::<_, Option<chrono::NaiveDateTime>>(i)
                .map(|x| x.map(|x| x.to_string())),
            Type::TIMESTAMPTZ => row
                .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(i)
                .map(|x| x.map(|x| x.to_string())),
            Type::DATE => row
                .try_get::<_, Option<chrono::NaiveDate>>(i)
                .map(|x| x.map(|x| x.to_string())),
            Type::TIME => row
                .try_get::<_, Option<chrono::NaiveTime>>(i)
                .map(|x| x.map(|x| x.to_string())),
            Type::UUID => row
                .try_get::<_, Option<uuid::Uuid>>(i)
                .map(|x| x.map(|x| x.to_string())),
            Type::JSON | Type::JSONB => row
                .try_get::<_, Option<serde_json::Value>>(i)
                .map(|x| x.map(|x| x.to_string())),
            Type::VOID => Ok(Some(String::new())),
            _ if <String as FromSql<'_>>::accepts(ty) => row.try_get::<_, Option<String>>(i),
            _ => {
                return Err(GatewayError::UnsupportedType {
                    column: col.name().to_string(),
                    type_name: ty.name().to_string(),
                });
            }
        }
        .map_err(decode_err)?;
        out.push((
            col.name().to_uppercase(),
            value.unwrap_or_else(|| "NULL".into()),
        ));
    }
    Ok(out)
}

/// A `numeric` value rendered in standard notation.
struct Numeric(String);

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

impl<'a> FromSql<'a> for Numeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Numeric, Box<dyn Error + Sync + Send>> {
        let word = |i: usize| -> Result<u16, Box<dyn Error + Sync + Send>> {
            match raw.get(i * 2..i * 2 + 2) {
                Some(b) => Ok(u16::from_be_bytes([b[0], b[1]])),
                None => Err("numeric value truncated".into()),
            }
        };
        let ndigits = usize::from(word(0)?);
        let weight = i64::from(word(1)? as i16);
        let sign = word(2)?;
        let dscale = usize::from(word(3)?);
        let digits = (0..ndigits)
            .map(|i| word(4 + i))
            .collect::<Result<Vec<_>, _>>()?;
        // Group `k` of the digits has the exponent `weight - k` in base
        // 10000; groups outside the stored digits are zero.
        let group = |k: i64| -> u16 {
            usize::try_from(k)
                .ok()
                .and_then(|k| digits.get(k).copied())
                .unwrap_or(0)
        };

        let mut s = String::new();
        match sign {
            NUMERIC_NAN => return Ok(Numeric("NaN".into())),
            NUMERIC_PINF => return Ok(Numeric("Infinity".into())),
            NUMERIC_NINF => return Ok(Numeric("-Infinity".into())),
            NUMERIC_NEG => s.push('-'),
            _ => (),
        }
        if weight < 0 {
            s.push('0');
        } else {
            write!(s, "{}", group(0))?;
            for k in 1..=weight {
                write!(s, "{:04}", group(k))?;
            }
        }
        if dscale > 0 {
            let mut frac = String::new();
            let mut k = weight + 1;
            while frac.len() < dscale {
                write!(frac, "{:04}", group(k))?;
                k += 1;
            }
            frac.truncate(dscale);
            s.push('.');
            s.push_str(&frac);
        }
        Ok(Numeric(s))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}
