//! Vehicle status changes, guarded by the `version` column. Every shift
//! is a single conditional UPDATE inside the caller's transaction; zero
//! rows affected means another writer got there first.

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::debug;
use uuid::Uuid;

use crate::entities::vehicle::{self, VehicleStatus};
use crate::errors::ServiceError;

/// Available -> Reserved, checked against the version the caller read.
pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    vehicle_id: Uuid,
    expected_version: i32,
) -> Result<(), ServiceError> {
    shift(conn, vehicle_id, &[VehicleStatus::Available], VehicleStatus::Reserved, Some(expected_version)).await
}

/// Reserved -> Rented when the rental starts.
pub async fn mark_rented<C: ConnectionTrait>(
    conn: &C,
    vehicle_id: Uuid,
    expected_version: i32,
) -> Result<(), ServiceError> {
    shift(conn, vehicle_id, &[VehicleStatus::Reserved], VehicleStatus::Rented, Some(expected_version)).await
}

/// Back to Available on completion or cancellation. Only valid from
/// Reserved/Rented: a vehicle moved to Maintenance or Repair in the
/// meantime belongs to that workflow now.
pub async fn release<C: ConnectionTrait>(conn: &C, vehicle_id: Uuid) -> Result<(), ServiceError> {
    shift(
        conn,
        vehicle_id,
        &[VehicleStatus::Reserved, VehicleStatus::Rented],
        VehicleStatus::Available,
        None,
    )
    .await
}

async fn shift<C: ConnectionTrait>(
    conn: &C,
    vehicle_id: Uuid,
    from: &[VehicleStatus],
    to: VehicleStatus,
    expected_version: Option<i32>,
) -> Result<(), ServiceError> {
    let mut update = vehicle::Entity::update_many()
        .col_expr(vehicle::Column::Status, Expr::value(to.to_string()))
        .col_expr(
            vehicle::Column::Version,
            Expr::col(vehicle::Column::Version).add(1),
        )
        .col_expr(vehicle::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(vehicle::Column::Id.eq(vehicle_id))
        .filter(
            vehicle::Column::Status.is_in(from.iter().map(ToString::to_string)),
        );
    if let Some(version) = expected_version {
        update = update.filter(vehicle::Column::Version.eq(version));
    }

    let res = update.exec(conn).await?;
    if res.rows_affected == 0 {
        let Some(current) = vehicle::Entity::find_by_id(vehicle_id).one(conn).await? else {
            return Err(ServiceError::NotFound(format!("vehicle {}", vehicle_id)));
        };
        return Err(ServiceError::VehicleStateConflict(format!(
            "vehicle {} is {} (version {})",
            vehicle_id, current.status, current.version
        )));
    }
    debug!(%vehicle_id, to = %to, "vehicle status shifted");
    Ok(())
}
