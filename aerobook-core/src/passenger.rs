use aerobook_shared::pii::Masked;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ancillary::AncillarySelection;
use crate::error::BookingError;
use crate::itinerary::FareBreakdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaxType {
    Adult,
    Child,
    Infant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub email: String,
    pub phone: String,
    pub address_line: String,
    pub city: String,
    pub country_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassportDetails {
    pub number: Masked<String>,
    pub expiry: NaiveDate,
    pub nationality: String,
}

/// Traveler identity as captured by the booking form. Validated by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerRecord {
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub pax_type: PaxType,
    pub gender: Gender,
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub is_lead: bool,
    pub contact: ContactDetails,
    pub passport: Option<PassportDetails>,
}

impl PassengerRecord {
    pub fn full_name(&self) -> String {
        format!("{} {} {}", self.title, self.first_name, self.last_name)
    }
}

/// Per-passenger money fields derived from the authoritative Requote fare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerFare {
    pub currency: String,
    pub base_fare: i64,
    pub tax: i64,
}

impl PassengerFare {
    /// Splits the authoritative fare across `passengers`, in their order.
    ///
    /// A type listed in `per_pax` shares its own slice. Passengers of any
    /// other type share what is left of the leg-level base fare and tax.
    /// Division remainders go to the lead passenger of each group, so the
    /// parts always add up to the quoted amounts.
    pub fn split(fare: &FareBreakdown, passengers: &[PassengerRecord]) -> Result<Vec<Self>, BookingError> {
        if passengers.is_empty() {
            return Err(BookingError::ValidationPrecondition(
                "no passengers to price".to_string(),
            ));
        }

        let mut amounts = vec![(0i64, 0i64); passengers.len()];
        let (mut covered_base, mut covered_tax) = (0i64, 0i64);
        let mut uncovered = Vec::new();

        for pax_type in [PaxType::Adult, PaxType::Child, PaxType::Infant] {
            let group: Vec<usize> = passengers
                .iter()
                .enumerate()
                .filter(|(_, p)| p.pax_type == pax_type)
                .map(|(i, _)| i)
                .collect();
            if group.is_empty() {
                continue;
            }
            match fare
                .per_pax
                .iter()
                .find(|f| f.pax_type == pax_type && f.pax_count > 0)
            {
                Some(slice) => {
                    covered_base += slice.base_fare;
                    covered_tax += slice.tax;
                    share(&mut amounts, passengers, &group, slice.base_fare, slice.tax);
                }
                None => uncovered.extend(group),
            }
        }

        if !uncovered.is_empty() {
            let base = fare.base_fare - covered_base;
            let tax = fare.tax - covered_tax;
            let nothing_priced = covered_base + covered_tax == 0 && base + tax <= 0;
            if base < 0 || tax < 0 || nothing_priced {
                return Err(BookingError::UpstreamBusiness {
                    code: 0,
                    message: format!(
                        "quoted fare (base {}, tax {} {}) cannot be split across {} passengers",
                        fare.base_fare,
                        fare.tax,
                        fare.currency,
                        uncovered.len()
                    ),
                });
            }
            uncovered.sort_unstable();
            share(&mut amounts, passengers, &uncovered, base, tax);
        }

        Ok(amounts
            .into_iter()
            .map(|(base_fare, tax)| Self {
                currency: fare.currency.clone(),
                base_fare,
                tax,
            })
            .collect())
    }
}

fn share(
    amounts: &mut [(i64, i64)],
    passengers: &[PassengerRecord],
    group: &[usize],
    base: i64,
    tax: i64,
) {
    let Some(&first) = group.first() else {
        return;
    };
    let count = group.len() as i64;
    for &i in group {
        amounts[i] = (base / count, tax / count);
    }
    let lead = group
        .iter()
        .copied()
        .find(|&i| passengers[i].is_lead)
        .unwrap_or(first);
    amounts[lead].0 += base % count;
    amounts[lead].1 += tax % count;
}

/// Passenger shape sent with Reserve: full identity plus fare.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservePassenger {
    #[serde(flatten)]
    pub identity: PassengerRecord,
    pub fare: PassengerFare,
}

/// Passenger shape sent with Issue: identity, fare and this leg's ancillaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuePassenger {
    #[serde(flatten)]
    pub identity: PassengerRecord,
    pub fare: PassengerFare,
    pub ancillaries: Vec<AncillarySelection>,
}
