//! Flight events posted by the flight operations system.

use crate::{BookingError, BookingResult, DynMailer, FlightState, Mail, Store};

/// Event name for a canceled flight.
pub const EVENT_FLIGHT_CANCELED: &str = "flight_canceled";

/// Event name for a flight whose ticket sales have completed.
pub const EVENT_TICKET_SALES_COMPLETED: &str = "flight_ticket_sales_completed";

/// A recognized flight event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightEvent {
    /// The flight was canceled.
    Canceled(u32),

    /// Ticket sales for the flight have completed.
    TicketSalesCompleted(u32),
}

impl FlightEvent {
    /// Map an event name onto a flight event.
    pub fn from_name(name: &str, flight_id: u32) -> BookingResult<Self> {
        match name {
            EVENT_FLIGHT_CANCELED => Ok(Self::Canceled(flight_id)),
            EVENT_TICKET_SALES_COMPLETED => {
                Ok(Self::TicketSalesCompleted(flight_id))
            }
            _ => Err(BookingError::Invalid("UnknownEvent")),
        }
    }

    /// Apply the event. Returns the number of passengers notified.
    pub fn apply(self, store: &Store, mailer: &DynMailer) -> BookingResult<usize> {
        match self {
            Self::TicketSalesCompleted(flight_id) => {
                store.set_flight_state(flight_id, FlightState::SalesClosed)?;
                tracing::info!(flight_id, "ticket sales completed");
                Ok(0)
            }
            Self::Canceled(flight_id) => {
                store.set_flight_state(flight_id, FlightState::Canceled)?;
                let emails = store.emails_for_flight(flight_id)?;
                tracing::info!(
                    flight_id,
                    passengers = emails.len(),
                    "flight canceled"
                );
                Ok(notify_canceled(flight_id, &emails, mailer))
            }
        }
    }
}

/// Mail every passenger. A failed delivery does not stop the others.
fn notify_canceled(flight_id: u32, emails: &[String], mailer: &DynMailer) -> usize {
    let mut sent = 0;
    for to in emails {
        let mail = Mail {
            to: to.clone(),
            subject: "Flight cancelation".to_string(),
            body: format!("Flight number {flight_id} has been canceled."),
        };
        match mailer.send(&mail) {
            Ok(()) => sent += 1,
            Err(err) => {
                tracing::warn!(?err, %to, flight_id, "failed to send cancelation mail");
            }
        }
    }
    sent
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Mailer, SeatStatus};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<Mail>>,
        fail_for: Option<&'static str>,
    }

    impl Mailer for Outbox {
        fn send(&self, mail: &Mail) -> std::io::Result<()> {
            if Some(mail.to.as_str()) == self.fail_for {
                return Err(std::io::Error::other("refused"));
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    fn booked_store() -> Store {
        let mut s = Store::open_in_memory().unwrap();
        s.fill_flight(7, 4).unwrap();
        let a = s.create_user("a@example.com", "h").unwrap();
        let b = s.create_user("b@example.com", "h").unwrap();
        s.create_user("c@example.com", "h").unwrap();
        s.claim_any(7, a, SeatStatus::Booked, None).unwrap();
        s.claim_any(7, b, SeatStatus::Bought, None).unwrap();
        s.claim_any(7, b, SeatStatus::Booked, None).unwrap();
        s
    }

    #[test]
    fn unknown_event() {
        assert!(matches!(
            FlightEvent::from_name("flight_delayed", 7),
            Err(BookingError::Invalid("UnknownEvent"))
        ));
        assert_eq!(
            FlightEvent::Canceled(7),
            FlightEvent::from_name("flight_canceled", 7).unwrap()
        );
    }

    #[test]
    fn cancel_notifies_each_passenger_once() {
        let s = booked_store();
        let outbox = Arc::new(Outbox::default());
        let mailer: DynMailer = outbox.clone();

        assert_eq!(2, FlightEvent::Canceled(7).apply(&s, &mailer).unwrap());

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(
            vec!["a@example.com", "b@example.com"],
            sent.iter().map(|m| m.to.as_str()).collect::<Vec<_>>()
        );
        assert_eq!("Flight cancelation", sent[0].subject);
        assert_eq!("Flight number 7 has been canceled.", sent[0].body);
        assert_eq!(FlightState::Canceled, s.flight_state(7).unwrap());
    }

    #[test]
    fn cancel_continues_past_failed_delivery() {
        let s = booked_store();
        let outbox = Arc::new(Outbox {
            fail_for: Some("a@example.com"),
            ..Default::default()
        });
        let mailer: DynMailer = outbox.clone();

        assert_eq!(1, FlightEvent::Canceled(7).apply(&s, &mailer).unwrap());
        assert_eq!(1, outbox.sent.lock().unwrap().len());
    }

    #[test]
    fn sales_completed_sends_nothing() {
        let s = booked_store();
        let outbox = Arc::new(Outbox::default());
        let mailer: DynMailer = outbox.clone();

        assert_eq!(
            0,
            FlightEvent::TicketSalesCompleted(7).apply(&s, &mailer).unwrap()
        );
        assert!(outbox.sent.lock().unwrap().is_empty());
        assert_eq!(FlightState::SalesClosed, s.flight_state(7).unwrap());
    }
}
