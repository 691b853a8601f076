//! Email bodies and the calendar attachment.
//!
//! Every email is rendered as both HTML and plain text. Interpolated values are escaped
//! for HTML; calendar text is escaped per RFC 5545.

use chrono::{DateTime, Utc};

use crate::domain::types::{
    EmailAttachment, EmailMessage, EventRecord, OrganiserProfile, PaymentRecord,
    RegistrationRecord,
};

const DATE_FORMAT: &str = "%A %-d %B %Y, %H:%M UTC";

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `1250, "gbp"` -> `12.50 GBP`
pub fn format_amount(minor: i64, currency: &str) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!(
        "{sign}{}.{:02} {}",
        abs / 100,
        abs % 100,
        currency.to_ascii_uppercase()
    )
}

fn when(event: &EventRecord) -> String {
    event.start_at.format(DATE_FORMAT).to_string()
}

fn where_line(event: &EventRecord) -> String {
    event.location.clone().unwrap_or_else(|| "To be announced".to_owned())
}

fn wrap_html(heading: &str, body: &str) -> String {
    format!(
        "<!doctype html><html><body style=\"font-family:sans-serif\"><h2>{}</h2>{body}</body></html>",
        escape_html(heading)
    )
}

/// Buyer confirmation with an `event.ics` attachment.
pub fn confirmation_email(
    event: &EventRecord,
    ticket_name: &str,
    registration: &RegistrationRecord,
    payment: &PaymentRecord,
    reply_to: Option<&str>,
) -> EmailMessage {
    let amount = format_amount(payment.fee.gross, &payment.currency);
    let subject = format!("You're going to {}", event.title);
    let html = wrap_html(
        &subject,
        &format!(
            "<p>Hi {name},</p>\
             <p>Your registration is confirmed.</p>\
             <ul><li>Event: {title}</li><li>When: {when}</li><li>Where: {place}</li>\
             <li>Ticket: {ticket} &times; {qty}</li><li>Paid: {amount}</li></ul>\
             <p>A calendar invite is attached.</p>",
            name = escape_html(&registration.holder_name),
            title = escape_html(&event.title),
            when = escape_html(&when(event)),
            place = escape_html(&where_line(event)),
            ticket = escape_html(ticket_name),
            qty = registration.quantity,
        ),
    );
    let text = format!(
        "Hi {},\n\nYour registration is confirmed.\n\nEvent: {}\nWhen: {}\nWhere: {}\nTicket: {} x {}\nPaid: {}\n\nA calendar invite is attached.\n",
        registration.holder_name,
        event.title,
        when(event),
        where_line(event),
        ticket_name,
        registration.quantity,
        amount,
    );
    EmailMessage {
        to: registration.holder_email.clone(),
        subject,
        html,
        text,
        reply_to: reply_to.map(str::to_owned),
        attachments: vec![EmailAttachment {
            filename: "event.ics".to_owned(),
            content_type: "text/calendar; charset=utf-8; method=PUBLISH".to_owned(),
            content: event_ics(event, registration, Utc::now()).into_bytes(),
        }],
    }
}

/// Tells the organiser a ticket was sold.
pub fn organiser_sale_email(
    event: &EventRecord,
    organiser: &OrganiserProfile,
    registration: &RegistrationRecord,
    payment: &PaymentRecord,
) -> EmailMessage {
    let share = format_amount(payment.fee.payee_share, &payment.currency);
    let subject = format!("New registration for {}", event.title);
    let html = wrap_html(
        &subject,
        &format!(
            "<p>Hi {organiser},</p>\
             <p>{holder} ({email}) registered {qty} place(s). Your share: {share}.</p>",
            organiser = escape_html(&organiser.name),
            holder = escape_html(&registration.holder_name),
            email = escape_html(&registration.holder_email),
            qty = registration.quantity,
            share = escape_html(&share),
        ),
    );
    let text = format!(
        "Hi {},\n\n{} ({}) registered {} place(s). Your share: {}.\n",
        organiser.name,
        registration.holder_name,
        registration.holder_email,
        registration.quantity,
        share,
    );
    EmailMessage {
        to: organiser.email.clone(),
        subject,
        html,
        text,
        reply_to: None,
        attachments: vec![],
    }
}

pub fn reminder_email(event: &EventRecord, registration: &RegistrationRecord) -> EmailMessage {
    let subject = format!("Reminder: {} is coming up", event.title);
    let html = wrap_html(
        &subject,
        &format!(
            "<p>Hi {name},</p><p>{title} starts {when} at {place}.</p>",
            name = escape_html(&registration.holder_name),
            title = escape_html(&event.title),
            when = escape_html(&when(event)),
            place = escape_html(&where_line(event)),
        ),
    );
    let text = format!(
        "Hi {},\n\n{} starts {} at {}.\n",
        registration.holder_name,
        event.title,
        when(event),
        where_line(event),
    );
    EmailMessage {
        to: registration.holder_email.clone(),
        subject,
        html,
        text,
        reply_to: None,
        attachments: vec![],
    }
}

/// List of external attendees sent to the event's forwarding address (door staff,
/// venue security).
pub fn forwarding_email(
    event: &EventRecord,
    to: &str,
    organiser: Option<&OrganiserProfile>,
    attendees: &[RegistrationRecord],
) -> EmailMessage {
    let subject = format!("External attendees for {}", event.title);
    let rows: String = attendees
        .iter()
        .map(|r| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&r.holder_name),
                escape_html(&r.holder_email),
                r.quantity
            )
        })
        .collect();
    let lines: String = attendees
        .iter()
        .map(|r| format!("{}, {}, {}\n", r.holder_name, r.holder_email, r.quantity))
        .collect();
    let html = wrap_html(
        &subject,
        &format!(
            "<p>{title}, {when}.</p>\
             <table><tr><th>Name</th><th>Email</th><th>Places</th></tr>{rows}</table>",
            title = escape_html(&event.title),
            when = escape_html(&when(event)),
        ),
    );
    let text = format!(
        "{}, {}.\n\nName, Email, Places\n{lines}",
        event.title,
        when(event)
    );
    EmailMessage {
        to: to.to_owned(),
        subject,
        html,
        text,
        reply_to: organiser.map(|o| o.email.clone()),
        attachments: vec![],
    }
}

pub fn summary_email(
    event: &EventRecord,
    organiser: &OrganiserProfile,
    registrations: &[RegistrationRecord],
) -> EmailMessage {
    let active: Vec<&RegistrationRecord> =
        registrations.iter().filter(|r| !r.is_refunded()).collect();
    let places: u32 = active.iter().map(|r| r.quantity).sum();
    let external = active.iter().filter(|r| r.is_external).count();
    let refunded = registrations.len() - active.len();

    let subject = format!("{} starts tomorrow: {} places booked", event.title, places);
    let html = wrap_html(
        &subject,
        &format!(
            "<p>Hi {organiser},</p>\
             <ul><li>Registrations: {count}</li><li>Places: {places}</li>\
             <li>External attendees: {external}</li><li>Refunded: {refunded}</li></ul>",
            organiser = escape_html(&organiser.name),
            count = active.len(),
        ),
    );
    let text = format!(
        "Hi {},\n\nRegistrations: {}\nPlaces: {}\nExternal attendees: {}\nRefunded: {}\n",
        organiser.name,
        active.len(),
        places,
        external,
        refunded,
    );
    EmailMessage {
        to: organiser.email.clone(),
        subject,
        html,
        text,
        reply_to: None,
        attachments: vec![],
    }
}

fn ics_time(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

fn ics_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Single-event iCalendar document with CRLF line endings.
pub fn event_ics(
    event: &EventRecord,
    registration: &RegistrationRecord,
    stamp: DateTime<Utc>,
) -> String {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_owned(),
        "VERSION:2.0".to_owned(),
        "PRODID:-//Gather//Ticketing//EN".to_owned(),
        "METHOD:PUBLISH".to_owned(),
        "BEGIN:VEVENT".to_owned(),
        format!("UID:{}@gather", registration.id),
        format!("DTSTAMP:{}", ics_time(&stamp)),
        format!("DTSTART:{}", ics_time(&event.start_at)),
        format!("DTEND:{}", ics_time(&event.end_at)),
        format!("SUMMARY:{}", ics_escape(&event.title)),
    ];
    if let Some(location) = &event.location {
        lines.push(format!("LOCATION:{}", ics_escape(location)));
    }
    lines.push(format!(
        "DESCRIPTION:{}",
        ics_escape(&format!(
            "{} place(s) for {}",
            registration.quantity, registration.holder_name
        ))
    ));
    lines.push("END:VEVENT".to_owned());
    lines.push("END:VCALENDAR".to_owned());
    let mut doc = lines.join("\r\n");
    doc.push_str("\r\n");
    doc
}
