use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Patch, Record};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub text: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl Appointment {
    pub fn new(text: impl Into<String>, date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            date,
            time,
        }
    }

    pub fn is_on(&self, date: NaiveDate) -> bool {
        self.date == date
    }
}

impl Record for Appointment {
    type Patch = AppointmentPatch;

    const COLLECTION: &'static str = "appointments";
    const KIND: &'static str = "appointment";

    fn id(&self) -> Uuid {
        self.id
    }

    fn display_order(a: &Self, b: &Self) -> Ordering {
        (a.date, a.time).cmp(&(b.date, b.time))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppointmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
}

impl Patch<Appointment> for AppointmentPatch {
    fn apply(&self, appointment: &mut Appointment) {
        if let Some(text) = &self.text {
            appointment.text = text.clone();
        }
        if let Some(date) = self.date {
            appointment.date = date;
        }
        if let Some(time) = self.time {
            appointment.time = time;
        }
    }
}
