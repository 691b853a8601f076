use anyhow::Context as _;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr,
    TransactionError, TransactionTrait, sea_query::Expr,
};

use gather_domain::access::{AccessTier, EventAccess};
use gather_domain::fee::FeeSplit;
use gather_domain::id::{EventId, GroupId, PaymentId, RegistrationId, TicketId, UserId};
use gather_domain::payment::PaymentStatus;
use gather_ticketing_schema::{
    events, group_memberships, organiser_accounts, payments, registrations, tickets, users,
};

use crate::domain::repository::{
    EventRepository, PaymentRepository, PeopleRepository, RegistrationRepository,
    SettlementRepository,
};
use crate::domain::settlement::{
    SettlementDecision, SettlementSnapshot, decide_settlement, registration_for,
};
use crate::domain::types::{
    AccountSnapshot, BuyerProfile, EventRecord, OrganiserProfile, PaymentRecord,
    ProcessorAccount, RefundNotice, RefundResult, RegistrationRecord, SettlementOrder,
    SettlementResult, TicketRecord,
};
use crate::error::TicketingError;

// ── Event repository ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbEventRepository {
    pub db: DatabaseConnection,
}

impl EventRepository for DbEventRepository {
    async fn find_event(&self, id: EventId) -> Result<Option<EventRecord>, TicketingError> {
        let model = events::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find event by id")?;
        let event = model
            .map(event_from_model)
            .transpose()
            .context("decode event row")?;
        Ok(event)
    }

    async fn find_ticket(&self, id: TicketId) -> Result<Option<TicketRecord>, TicketingError> {
        let model = tickets::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find ticket by id")?;
        Ok(model.map(ticket_from_model))
    }
}

fn event_from_model(model: events::Model) -> Result<EventRecord, DbErr> {
    let tier = |v: i16| {
        u8::try_from(v)
            .ok()
            .and_then(AccessTier::from_u8)
            .ok_or_else(|| DbErr::Custom(format!("unknown access tier {v}")))
    };
    let groups: Vec<GroupId> = serde_json::from_value(model.allowed_group_ids)
        .map_err(|e| DbErr::Custom(format!("allowed_group_ids: {e}")))?;
    let access = EventAccess::new(
        tier(model.visibility_tier)?,
        tier(model.registration_tier)?,
        groups,
    )
    .map_err(|e| DbErr::Custom(e.to_string()))?;
    Ok(EventRecord {
        id: EventId(model.id),
        organiser_id: UserId(model.organiser_id),
        title: model.title,
        location: model.location,
        start_at: model.start_at,
        end_at: model.end_at,
        access,
        registration_cutoff_hours: model.registration_cutoff_hours,
        external_cutoff_hours: model.external_cutoff_hours,
        forwarding_email: model.forwarding_email.filter(|e| !e.trim().is_empty()),
        is_deleted: model.is_deleted,
    })
}

fn ticket_from_model(model: tickets::Model) -> TicketRecord {
    TicketRecord {
        id: TicketId(model.id),
        event_id: EventId(model.event_id),
        name: model.name,
        price_minor: model.price_minor,
        stock: model.stock,
        release_start: model.release_start,
        release_end: model.release_end,
    }
}

// ── Registration repository ──────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbRegistrationRepository {
    pub db: DatabaseConnection,
}

impl RegistrationRepository for DbRegistrationRepository {
    async fn registered_quantity(&self, ticket_id: TicketId) -> Result<i64, TicketingError> {
        let total = registered_quantity(&self.db, ticket_id)
            .await
            .context("sum registered quantity")?;
        Ok(total)
    }

    async fn find_by_holder(
        &self,
        event_id: EventId,
        holder_email: &str,
    ) -> Result<Option<RegistrationRecord>, TicketingError> {
        let registration = find_by_holder(&self.db, event_id, holder_email)
            .await
            .context("find registration by holder")?;
        Ok(registration)
    }

    async fn find_by_id(
        &self,
        id: RegistrationId,
    ) -> Result<Option<RegistrationRecord>, TicketingError> {
        let model = registrations::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find registration by id")?;
        let registration = model
            .map(registration_from_model)
            .transpose()
            .context("decode registration row")?;
        Ok(registration)
    }

    async fn list_for_event(
        &self,
        event_id: EventId,
    ) -> Result<Vec<RegistrationRecord>, TicketingError> {
        let models = registrations::Entity::find()
            .filter(registrations::Column::EventId.eq(event_id.0))
            .order_by_asc(registrations::Column::CreatedAt)
            .all(&self.db)
            .await
            .context("list registrations for event")?;
        let registrations = models
            .into_iter()
            .map(registration_from_model)
            .collect::<Result<Vec<_>, _>>()
            .context("decode registration rows")?;
        Ok(registrations)
    }
}

async fn registered_quantity<C: ConnectionTrait>(
    conn: &C,
    ticket_id: TicketId,
) -> Result<i64, DbErr> {
    let total: Option<Option<i64>> = registrations::Entity::find()
        .select_only()
        .column_as(Expr::col(registrations::Column::Quantity).sum(), "total")
        .filter(registrations::Column::TicketId.eq(ticket_id.0))
        .into_tuple()
        .one(conn)
        .await?;
    Ok(total.flatten().unwrap_or(0))
}

async fn find_by_holder<C: ConnectionTrait>(
    conn: &C,
    event_id: EventId,
    holder_email: &str,
) -> Result<Option<RegistrationRecord>, DbErr> {
    registrations::Entity::find()
        .filter(registrations::Column::EventId.eq(event_id.0))
        .filter(registrations::Column::HolderEmail.eq(holder_email))
        .one(conn)
        .await?
        .map(registration_from_model)
        .transpose()
}

fn registration_from_model(model: registrations::Model) -> Result<RegistrationRecord, DbErr> {
    let payment_status = model
        .payment_status
        .as_deref()
        .map(|s| {
            PaymentStatus::parse(s)
                .ok_or_else(|| DbErr::Custom(format!("unknown payment status {s}")))
        })
        .transpose()?;
    Ok(RegistrationRecord {
        id: RegistrationId(model.id),
        event_id: EventId(model.event_id),
        ticket_id: TicketId(model.ticket_id),
        user_id: model.user_id.map(UserId),
        holder_name: model.holder_name,
        holder_email: model.holder_email,
        quantity: non_negative(model.quantity, "registration quantity")?,
        is_external: model.is_external,
        payment_id: model.payment_id.map(PaymentId),
        payment_status,
        created_at: model.created_at,
    })
}

// ── People repository ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbPeopleRepository {
    pub db: DatabaseConnection,
}

impl PeopleRepository for DbPeopleRepository {
    async fn find_buyer(&self, id: UserId) -> Result<Option<BuyerProfile>, TicketingError> {
        let Some(user) = users::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find buyer")?
        else {
            return Ok(None);
        };
        let group_ids = group_memberships::Entity::find()
            .filter(group_memberships::Column::UserId.eq(id.0))
            .all(&self.db)
            .await
            .context("list buyer groups")?
            .into_iter()
            .map(|m| GroupId(m.group_id))
            .collect();
        Ok(Some(BuyerProfile {
            id,
            email: user.email,
            name: user.name,
            affiliation: user.affiliation,
            group_ids,
        }))
    }

    async fn find_organiser(
        &self,
        id: UserId,
    ) -> Result<Option<OrganiserProfile>, TicketingError> {
        let Some(user) = users::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find organiser")?
        else {
            return Ok(None);
        };
        let account = organiser_accounts::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find organiser account")?
            .map(|a| ProcessorAccount {
                account_id: a.processor_account_id,
                charges_enabled: a.charges_enabled,
                payouts_enabled: a.payouts_enabled,
                details_submitted: a.details_submitted,
            });
        Ok(Some(OrganiserProfile {
            id,
            email: user.email,
            name: user.name,
            affiliation: user.affiliation,
            notifications_enabled: user.notifications_enabled,
            account,
        }))
    }
}

// ── Payment repository ───────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbPaymentRepository {
    pub db: DatabaseConnection,
}

impl PaymentRepository for DbPaymentRepository {
    async fn create_pending(&self, payment: &PaymentRecord) -> Result<(), TicketingError> {
        payments::ActiveModel {
            id: Set(payment.id.0),
            event_id: Set(payment.event_id.0),
            ticket_id: Set(payment.ticket_id.0),
            payer_id: Set(payment.payer_id.map(|u| u.0)),
            session_id: Set(payment.session_id.clone()),
            buyer_email: Set(payment.buyer_email.clone()),
            buyer_name: Set(payment.buyer_name.clone()),
            quantity: Set(payment.quantity as i32),
            is_guest: Set(payment.is_guest),
            is_external: Set(payment.is_external),
            currency: Set(payment.currency.clone()),
            gross_minor: Set(payment.fee.gross),
            platform_fee_minor: Set(payment.fee.platform_fee),
            payee_share_minor: Set(payment.fee.payee_share),
            fee_version: Set(payment.fee.fee_version as i16),
            status: Set(payment.status.as_str().to_owned()),
            payment_reference: Set(payment.payment_reference.clone()),
            registration_id: Set(payment.registration_id.map(|r| r.0)),
            refund_amount_minor: Set(payment.refund_amount_minor),
            refund_reference: Set(payment.refund_reference.clone()),
            failure_reason: Set(payment.failure_reason.clone()),
            created_at: Set(payment.created_at),
            updated_at: Set(payment.updated_at),
        }
        .insert(&self.db)
        .await
        .context("create pending payment")?;
        Ok(())
    }
}

fn payment_from_model(model: payments::Model) -> Result<PaymentRecord, DbErr> {
    let status = PaymentStatus::parse(&model.status)
        .ok_or_else(|| DbErr::Custom(format!("unknown payment status {}", model.status)))?;
    Ok(PaymentRecord {
        id: PaymentId(model.id),
        event_id: EventId(model.event_id),
        ticket_id: TicketId(model.ticket_id),
        payer_id: model.payer_id.map(UserId),
        session_id: model.session_id,
        buyer_email: model.buyer_email,
        buyer_name: model.buyer_name,
        quantity: non_negative(model.quantity, "payment quantity")?,
        is_guest: model.is_guest,
        is_external: model.is_external,
        currency: model.currency,
        fee: FeeSplit {
            gross: model.gross_minor,
            platform_fee: model.platform_fee_minor,
            payee_share: model.payee_share_minor,
            fee_version: u16::try_from(model.fee_version)
                .map_err(|_| DbErr::Custom(format!("bad fee version {}", model.fee_version)))?,
        },
        status,
        payment_reference: model.payment_reference,
        registration_id: model.registration_id.map(RegistrationId),
        refund_amount_minor: model.refund_amount_minor,
        refund_reference: model.refund_reference,
        failure_reason: model.failure_reason,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn non_negative(v: i32, what: &str) -> Result<u32, DbErr> {
    u32::try_from(v).map_err(|_| DbErr::Custom(format!("negative {what}: {v}")))
}

// ── Settlement repository ────────────────────────────────────────────────────

const DUPLICATE_HOLDER: &str = "holder already registered for this event";

#[derive(Clone)]
pub struct DbSettlementRepository {
    pub db: DatabaseConnection,
}

impl SettlementRepository for DbSettlementRepository {
    async fn settle_checkout(
        &self,
        order: &SettlementOrder,
    ) -> Result<SettlementResult, TicketingError> {
        let result = self
            .db
            .transaction::<_, SettlementResult, DbErr>(|txn| {
                let order = order.clone();
                Box::pin(async move { settle_in(txn, &order).await })
            })
            .await;
        match result {
            Ok(result) => Ok(result),
            // A concurrent settlement for the same holder won the unique index.
            Err(TransactionError::Transaction(err)) if is_holder_conflict(err.sql_err()) => {
                self.fail_pending(&order.session_id, DUPLICATE_HOLDER).await?;
                Ok(SettlementResult::Rejected {
                    reason: DUPLICATE_HOLDER.to_owned(),
                })
            }
            Err(err) => Err(anyhow::Error::new(err).context("settle checkout").into()),
        }
    }

    async fn fail_pending(&self, session_id: &str, reason: &str) -> Result<bool, TicketingError> {
        let result = payments::Entity::update_many()
            .col_expr(
                payments::Column::Status,
                Expr::value(PaymentStatus::Failed.as_str()),
            )
            .col_expr(payments::Column::FailureReason, Expr::value(reason))
            .col_expr(payments::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payments::Column::SessionId.eq(session_id))
            .filter(payments::Column::Status.eq(PaymentStatus::Pending.as_str()))
            .exec(&self.db)
            .await
            .context("fail pending payment")?;
        Ok(result.rows_affected > 0)
    }

    async fn refund(&self, notice: &RefundNotice) -> Result<RefundResult, TicketingError> {
        let result = self
            .db
            .transaction::<_, RefundResult, DbErr>(|txn| {
                let notice = notice.clone();
                Box::pin(async move { refund_in(txn, &notice).await })
            })
            .await
            .context("refund payment")?;
        Ok(result)
    }

    async fn sync_account(&self, snapshot: &AccountSnapshot) -> Result<bool, TicketingError> {
        let result = organiser_accounts::Entity::update_many()
            .col_expr(
                organiser_accounts::Column::ChargesEnabled,
                Expr::value(snapshot.charges_enabled),
            )
            .col_expr(
                organiser_accounts::Column::PayoutsEnabled,
                Expr::value(snapshot.payouts_enabled),
            )
            .col_expr(
                organiser_accounts::Column::DetailsSubmitted,
                Expr::value(snapshot.details_submitted),
            )
            .col_expr(organiser_accounts::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(organiser_accounts::Column::ProcessorAccountId.eq(snapshot.account_id.as_str()))
            .exec(&self.db)
            .await
            .context("sync organiser account")?;
        Ok(result.rows_affected > 0)
    }
}

/// Settlement inserts one registration and only updates other rows, so the one unique
/// index it can trip is `(event_id, holder_email)`.
fn is_holder_conflict(err: Option<SqlErr>) -> bool {
    matches!(err, Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Payment and ticket rows stay locked until the transaction ends, so concurrent
/// settlements for the same ticket serialize here.
async fn settle_in(
    txn: &DatabaseTransaction,
    order: &SettlementOrder,
) -> Result<SettlementResult, DbErr> {
    let Some(payment) = payments::Entity::find()
        .filter(payments::Column::SessionId.eq(order.session_id.as_str()))
        .lock_exclusive()
        .one(txn)
        .await?
    else {
        return Ok(SettlementResult::Rejected {
            reason: "payment not found".to_owned(),
        });
    };
    let payment = payment_from_model(payment)?;

    let Some(ticket) = tickets::Entity::find_by_id(payment.ticket_id.0)
        .lock_exclusive()
        .one(txn)
        .await?
    else {
        let reason = "ticket not found".to_owned();
        if payment.status == PaymentStatus::Pending {
            mark_failed(txn, payment.id, &reason).await?;
        }
        return Ok(SettlementResult::Rejected { reason });
    };

    let snapshot = SettlementSnapshot {
        registered_quantity: registered_quantity(txn, payment.ticket_id).await?,
        existing_registration: find_by_holder(txn, payment.event_id, &payment.buyer_email)
            .await?,
        stock: ticket.stock,
        payment,
    };

    match decide_settlement(&snapshot, order) {
        SettlementDecision::Settle => {
            let now = Utc::now();
            let registration = registration_for(&snapshot.payment, now);
            insert_registration(txn, &registration).await?;
            let payment = payments::ActiveModel {
                id: Set(snapshot.payment.id.0),
                status: Set(PaymentStatus::Succeeded.as_str().to_owned()),
                payment_reference: Set(order.payment_reference.clone()),
                registration_id: Set(Some(registration.id.0)),
                updated_at: Set(now),
                ..Default::default()
            }
            .update(txn)
            .await?;
            Ok(SettlementResult::Settled {
                payment: payment_from_model(payment)?,
                registration,
            })
        }
        SettlementDecision::AlreadySettled { registration_id } => {
            Ok(SettlementResult::AlreadySettled { registration_id })
        }
        SettlementDecision::Ignore { status } => Ok(SettlementResult::Ignored { status }),
        SettlementDecision::Reject { reason } => {
            mark_failed(txn, snapshot.payment.id, &reason).await?;
            Ok(SettlementResult::Rejected { reason })
        }
    }
}

async fn insert_registration(
    txn: &DatabaseTransaction,
    registration: &RegistrationRecord,
) -> Result<(), DbErr> {
    registrations::ActiveModel {
        id: Set(registration.id.0),
        event_id: Set(registration.event_id.0),
        ticket_id: Set(registration.ticket_id.0),
        user_id: Set(registration.user_id.map(|u| u.0)),
        holder_name: Set(registration.holder_name.clone()),
        holder_email: Set(registration.holder_email.clone()),
        quantity: Set(registration.quantity as i32),
        is_external: Set(registration.is_external),
        payment_id: Set(registration.payment_id.map(|p| p.0)),
        payment_status: Set(registration.payment_status.map(|s| s.as_str().to_owned())),
        created_at: Set(registration.created_at),
    }
    .insert(txn)
    .await?;
    Ok(())
}

async fn mark_failed(txn: &DatabaseTransaction, id: PaymentId, reason: &str) -> Result<(), DbErr> {
    payments::ActiveModel {
        id: Set(id.0),
        status: Set(PaymentStatus::Failed.as_str().to_owned()),
        failure_reason: Set(Some(reason.to_owned())),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .update(txn)
    .await?;
    Ok(())
}

async fn refund_in(txn: &DatabaseTransaction, notice: &RefundNotice) -> Result<RefundResult, DbErr> {
    let Some(model) = payments::Entity::find()
        .filter(payments::Column::PaymentReference.eq(notice.payment_reference.as_str()))
        .lock_exclusive()
        .one(txn)
        .await?
    else {
        return Ok(RefundResult::UnknownPayment);
    };
    let payment = payment_from_model(model)?;
    if payment.status == PaymentStatus::Refunded {
        return Ok(RefundResult::AlreadyRefunded);
    }
    if !payment.status.can_transition_to(PaymentStatus::Refunded) {
        return Ok(RefundResult::NotRefundable {
            status: payment.status,
        });
    }

    let now = Utc::now();
    payments::ActiveModel {
        id: Set(payment.id.0),
        status: Set(PaymentStatus::Refunded.as_str().to_owned()),
        refund_amount_minor: Set(Some(notice.amount_refunded)),
        refund_reference: Set(Some(notice.refund_reference.clone())),
        updated_at: Set(now),
        ..Default::default()
    }
    .update(txn)
    .await?;

    if let Some(registration_id) = payment.registration_id {
        registrations::Entity::update_many()
            .col_expr(
                registrations::Column::PaymentStatus,
                Expr::value(PaymentStatus::Refunded.as_str()),
            )
            .filter(registrations::Column::Id.eq(registration_id.0))
            .exec(txn)
            .await?;
    }
    Ok(RefundResult::Refunded {
        payment_id: payment.id,
        registration_id: payment.registration_id,
    })
}
