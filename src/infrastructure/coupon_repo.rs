use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::coupon::{Coupon, CouponKind, NewCoupon};
use crate::domain::errors::{CouponRejection, DomainError};
use crate::domain::ports::CouponRepository;
use crate::schema::coupons;

use super::models::{CouponRow, NewCouponRow};

/// Reads a coupon by code and holds its row lock for the rest of the
/// transaction.
pub(crate) fn lock_by_code(
    conn: &mut PgConnection,
    code: &str,
) -> Result<Option<Coupon>, DomainError> {
    coupons::table
        .filter(coupons::code.eq(code))
        .select(CouponRow::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .map(Coupon::try_from)
        .transpose()
}

/// Single-use compare-and-set on `is_used`. Losing the race means the coupon
/// was consumed by someone else.
pub(crate) fn consume(
    conn: &mut PgConnection,
    coupon_id: Uuid,
    order_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), DomainError> {
    let updated = diesel::update(
        coupons::table
            .filter(coupons::id.eq(coupon_id))
            .filter(coupons::is_used.eq(false)),
    )
    .set((
        coupons::is_used.eq(true),
        coupons::used_at.eq(Some(now)),
        coupons::order_id.eq(Some(order_id)),
    ))
    .execute(conn)?;

    if updated == 1 {
        Ok(())
    } else {
        Err(DomainError::CouponRejected(CouponRejection::AlreadyUsed))
    }
}

pub struct DieselCouponRepository {
    pool: DbPool,
}

impl DieselCouponRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl CouponRepository for DieselCouponRepository {
    fn insert(&self, coupon: NewCoupon) -> Result<Coupon, DomainError> {
        let mut conn = self.pool.get()?;
        let row = diesel::insert_into(coupons::table)
            .values(&NewCouponRow::from(coupon))
            .returning(CouponRow::as_returning())
            .get_result(&mut conn)?;
        Coupon::try_from(row)
    }

    fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, DomainError> {
        let mut conn = self.pool.get()?;
        coupons::table
            .filter(coupons::code.eq(code))
            .select(CouponRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Coupon::try_from)
            .transpose()
    }

    fn find_welcome(&self, owner_id: Uuid) -> Result<Option<Coupon>, DomainError> {
        let mut conn = self.pool.get()?;
        coupons::table
            .filter(coupons::owner_id.eq(owner_id))
            .filter(coupons::kind.eq(CouponKind::Welcome.as_str()))
            .select(CouponRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Coupon::try_from)
            .transpose()
    }

    fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<Coupon>, DomainError> {
        let mut conn = self.pool.get()?;
        coupons::table
            .filter(coupons::owner_id.eq(owner_id))
            .order(coupons::created_at.desc())
            .select(CouponRow::as_select())
            .load(&mut conn)?
            .into_iter()
            .map(Coupon::try_from)
            .collect()
    }
}
