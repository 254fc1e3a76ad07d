//! Calendar-invite links for a confirmed booking.

use url::form_urlencoded;

use crate::models::BookingConfirmation;

/// A Google Calendar "render" link pre-filled with the appointment.
pub fn google_calendar_url(confirmation: &BookingConfirmation) -> String {
    let title = format!(
        "{} — {}",
        confirmation.service.name,
        confirmation.specialist.full_name()
    );
    let dates = format!(
        "{}T{}00/{}T{}00",
        compact_date(&confirmation.date),
        compact_time(&confirmation.slot.start_time),
        compact_date(&confirmation.date),
        compact_time(&confirmation.slot.end_time),
    );
    let details = format!("Запись №{}", confirmation.appointment_id);

    let query: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("action", "TEMPLATE")
        .append_pair("text", &title)
        .append_pair("dates", &dates)
        .append_pair("details", &details)
        .finish();
    format!("https://calendar.google.com/calendar/render?{query}")
}

/// An iCalendar payload for mail clients.
pub fn ics(confirmation: &BookingConfirmation) -> String {
    let date = compact_date(&confirmation.date);
    let start = compact_time(&confirmation.slot.start_time);
    let end = compact_time(&confirmation.slot.end_time);
    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Veluna//Booking//RU\r\n\
         BEGIN:VEVENT\r\n\
         UID:veluna-appointment-{id}\r\n\
         DTSTART:{date}T{start}00\r\n\
         DTEND:{date}T{end}00\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:Запись №{id}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n",
        id = confirmation.appointment_id,
        summary = format!(
            "{} — {}",
            confirmation.service.name,
            confirmation.specialist.full_name()
        ),
    )
}

/// `2025-04-28` → `20250428`.
fn compact_date(date: &str) -> String {
    date.replace('-', "")
}

/// `14:30` → `1430`.
fn compact_time(time: &str) -> String {
    time.replace(':', "")
}

// ── Tests ──
