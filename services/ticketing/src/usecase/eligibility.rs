use anyhow::anyhow;
use chrono::{DateTime, Utc};

use gather_domain::access::{CallerAccess, is_external};
use gather_domain::id::{EventId, TicketId};

use crate::domain::repository::{EventRepository, PeopleRepository, RegistrationRepository};
use crate::domain::types::{
    Buyer, EventRecord, Holder, MAX_QUANTITY, MIN_QUANTITY, OrganiserProfile, TicketRecord,
};
use crate::error::TicketingError;

pub struct EligibilityRequest {
    pub event_id: EventId,
    pub ticket_id: TicketId,
    pub quantity: u32,
    pub buyer: Buyer,
    pub now: DateTime<Utc>,
}

/// A purchase that passed every check, with the rows it was decided on.
#[derive(Debug, Clone)]
pub struct EligibleOrder {
    pub event: EventRecord,
    pub ticket: TicketRecord,
    pub organiser: OrganiserProfile,
    pub holder: Holder,
    pub quantity: u32,
    pub is_external: bool,
}

pub fn validate_quantity(quantity: u32) -> Result<u32, TicketingError> {
    if (MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
        Ok(quantity)
    } else {
        Err(TicketingError::InvalidQuantity)
    }
}

/// Compare requested quantity against stock derived from the ceiling and live registrations.
pub fn check_stock(stock: i32, registered: i64, requested: u32) -> Result<(), TicketingError> {
    let remaining = i64::from(stock) - registered;
    if remaining >= i64::from(requested) {
        Ok(())
    } else if remaining <= 0 {
        Err(TicketingError::SoldOut)
    } else {
        Err(TicketingError::InsufficientStock { remaining })
    }
}

pub fn normalise_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Decides whether a purchase may proceed. Checks run in a fixed order and stop at the
/// first failure.
pub struct EligibilityGate<E, R, P>
where
    E: EventRepository,
    R: RegistrationRepository,
    P: PeopleRepository,
{
    pub events: E,
    pub registrations: R,
    pub people: P,
}

impl<E, R, P> EligibilityGate<E, R, P>
where
    E: EventRepository,
    R: RegistrationRepository,
    P: PeopleRepository,
{
    pub async fn check(&self, req: EligibilityRequest) -> Result<EligibleOrder, TicketingError> {
        let quantity = validate_quantity(req.quantity)?;
        let now = req.now;

        // 1. Event exists and is live
        let event = self
            .events
            .find_event(req.event_id)
            .await?
            .filter(|e| !e.is_deleted)
            .ok_or(TicketingError::EventNotFound)?;

        // 2. Not over
        if now > event.end_at {
            return Err(TicketingError::EventEnded);
        }

        // 3. Access tier
        let organiser = self
            .people
            .find_organiser(event.organiser_id)
            .await?
            .ok_or_else(|| anyhow!("organiser {} of event {} missing", event.organiser_id, event.id))?;

        let (holder, is_external) = match req.buyer {
            Buyer::Guest { name, email } => {
                if !event.access.permits_registration(None) {
                    return Err(TicketingError::GuestNotPermitted);
                }
                let holder = Holder {
                    user_id: None,
                    name: name.trim().to_owned(),
                    email: normalise_email(&email),
                };
                (holder, true)
            }
            Buyer::Member(user_id) => {
                let profile = self
                    .people
                    .find_buyer(user_id)
                    .await?
                    .ok_or(TicketingError::UserNotFound)?;
                let external = is_external(
                    profile.affiliation.as_deref(),
                    organiser.affiliation.as_deref(),
                );
                let caller = CallerAccess {
                    is_external: external,
                    group_ids: &profile.group_ids,
                };
                if !event.access.permits_registration(Some(&caller)) {
                    return Err(TicketingError::NotEligible);
                }
                let holder = Holder {
                    user_id: Some(profile.id),
                    name: profile.name,
                    email: normalise_email(&profile.email),
                };
                (holder, external)
            }
        };

        // 4. Registration cutoff
        if let Some(cutoff) = event.registration_cutoff(is_external) {
            if now >= cutoff {
                return Err(TicketingError::RegistrationClosed);
            }
        }

        // 5. Ticket belongs to the event, is priced and on sale
        let ticket = self
            .events
            .find_ticket(req.ticket_id)
            .await?
            .filter(|t| t.event_id == event.id)
            .ok_or(TicketingError::TicketNotFound)?;
        if ticket.price_minor <= 0 {
            return Err(TicketingError::TicketNotPaid);
        }
        if !ticket.is_on_sale(now) {
            return Err(TicketingError::TicketNotOnSale);
        }

        // 6. Derived stock
        if let Some(stock) = ticket.stock {
            let registered = self.registrations.registered_quantity(ticket.id).await?;
            check_stock(stock, registered, quantity)?;
        }

        // 7. One registration per holder
        if self
            .registrations
            .find_by_holder(event.id, &holder.email)
            .await?
            .is_some()
        {
            return Err(TicketingError::AlreadyRegistered);
        }

        Ok(EligibleOrder {
            event,
            ticket,
            organiser,
            holder,
            quantity,
            is_external,
        })
    }
}
