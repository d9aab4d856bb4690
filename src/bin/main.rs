// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use csv::{ReaderBuilder, Trim, Writer};
use membership_ledger_rs::{
    Clock, Engine, FeedRecord, FixedClock, LedgerConfig, Member, MemoryStore, Outbox,
    ReferenceNumber, ReservationId, ReservationStatus, Service, StorageReservation,
    StorageService, StorageUnit, Stores, Subscription, SystemClock, UnitId, UserId,
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Membership ledger - replay a bank feed against a register snapshot
///
/// Loads services, members and subscriptions (and optionally storage units
/// and reservations) from CSV files, applies every feed transaction, runs
/// the daily job and writes the resulting table to stdout.
#[derive(Parser, Debug)]
#[command(name = "membership-ledger")]
#[command(about = "Reconciles a bank feed against membership subscriptions", long_about = None)]
struct Args {
    /// Path to the bank feed CSV
    ///
    /// Expected format: date,amount,reference,sender,archival_reference
    #[arg(value_name = "FEED")]
    feed: PathBuf,

    /// Services CSV
    #[arg(long)]
    services: PathBuf,

    /// Members CSV (id,name,email)
    #[arg(long)]
    members: PathBuf,

    /// Subscriptions CSV
    #[arg(long)]
    subscriptions: Option<PathBuf>,

    /// Storage services CSV (id,name,pending_payment_days)
    #[arg(long)]
    storage_services: Option<PathBuf>,

    /// Storage units CSV
    #[arg(long)]
    units: Option<PathBuf>,

    /// Storage reservations CSV
    #[arg(long)]
    reservations: Option<PathBuf>,

    /// Date to treat as today (YYYY-MM-DD). Defaults to the system date.
    #[arg(long)]
    today: Option<NaiveDate>,

    /// Which table to write to stdout
    #[arg(long, value_enum, default_value = "subscriptions")]
    report: Report,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Report {
    Subscriptions,
    Reservations,
}

fn main() {
    let args = Args::parse();

    let config = match LedgerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        process::exit(1);
    }

    // Logs go to stderr so stdout stays a clean CSV report.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let clock: Arc<dyn Clock> = match args.today {
        Some(today) => Arc::new(FixedClock::new(today)),
        None => Arc::new(SystemClock),
    };

    let store = Arc::new(MemoryStore::new());
    if let Err(e) = load_snapshot(&store, &args, clock.as_ref()) {
        eprintln!("Error loading snapshot: {}", e);
        process::exit(1);
    }

    let outbox = Arc::new(Outbox::new());
    let engine = Engine::new(
        Stores::from_shared(store.clone()),
        clock.clone(),
        outbox.clone(),
        config,
    );

    let processed = match open(&args.feed).and_then(|file| process_feed(&engine, file)) {
        Ok(processed) => processed,
        Err(e) => {
            eprintln!("Error processing feed '{}': {}", args.feed.display(), e);
            process::exit(1);
        }
    };

    let daily = engine.run_daily();
    info!(
        processed,
        warnings = daily.warnings_sent,
        payments = daily.reconciliation.payments_applied,
        expired = daily.sweep.expired,
        completed = daily.sweep.completed,
        queued_notifications = outbox.len(),
        "feed replayed"
    );

    let stdout = std::io::stdout();
    let result = match args.report {
        Report::Subscriptions => write_subscriptions(&store, clock.today(), stdout),
        Report::Reservations => write_reservations(&store, clock.today(), stdout),
    };
    if let Err(e) = result {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

fn open(path: &Path) -> Result<BufReader<File>, csv::Error> {
    Ok(BufReader::new(File::open(path)?))
}

/// Reads every row of a headed CSV, failing on the first malformed row.
fn read_rows<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>, csv::Error> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader)
        .deserialize()
        .collect()
}

/// Reservation row as kept in the register export.
#[derive(Debug, Deserialize)]
struct ReservationRow {
    id: u64,
    user: u64,
    unit: u64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    status: ReservationStatus,
    total_paid_months: u32,
    max_duration_months: Option<u32>,
    reference_number: Option<String>,
    pending_until: Option<NaiveDate>,
}

fn load_snapshot(store: &MemoryStore, args: &Args, clock: &dyn Clock) -> Result<(), csv::Error> {
    for service in read_rows::<Service, _>(open(&args.services)?)? {
        store.add_service(service);
    }
    for member in read_rows::<Member, _>(open(&args.members)?)? {
        store.add_member(member);
    }
    if let Some(path) = &args.subscriptions {
        for subscription in read_rows::<Subscription, _>(open(path)?)? {
            store.restore_subscription(subscription);
        }
    }
    if let Some(path) = &args.storage_services {
        for service in read_rows::<StorageService, _>(open(path)?)? {
            store.add_storage_service(service);
        }
    }
    if let Some(path) = &args.units {
        for unit in read_rows::<StorageUnit, _>(open(path)?)? {
            store.add_unit(unit);
        }
    }
    if let Some(path) = &args.reservations {
        for row in read_rows::<ReservationRow, _>(open(path)?)? {
            store.restore_reservation(StorageReservation {
                id: ReservationId(row.id),
                user: UserId(row.user),
                unit: UnitId(row.unit),
                start_date: row.start_date,
                end_date: row.end_date,
                status: row.status,
                total_paid_months: row.total_paid_months,
                max_duration_months: row.max_duration_months,
                reference_number: row.reference_number.as_deref().and_then(ReferenceNumber::parse),
                pending_until: row.pending_until,
                paid_at: None,
                created_at: clock.now(),
            });
        }
    }
    Ok(())
}

/// Feed row: `date, amount, reference, sender, archival_reference`.
#[derive(Debug, Deserialize)]
struct FeedRow {
    date: NaiveDate,
    amount: Decimal,
    reference: Option<String>,
    sender: Option<String>,
    archival_reference: Option<String>,
}

impl FeedRow {
    fn into_record(self) -> FeedRecord {
        let mut record = FeedRecord::new(self.date, self.amount, self.reference.as_deref());
        if let Some(sender) = self.sender.filter(|s| !s.is_empty()) {
            record = record.with_sender(sender);
        }
        if let Some(archival) = self.archival_reference.filter(|s| !s.is_empty()) {
            record = record.with_archival_reference(archival);
        }
        record
    }
}

/// Applies every row of the feed in file order.
///
/// Malformed rows and rejected transactions are logged and skipped.
/// Returns the number of transactions accepted.
///
/// # Errors
///
/// Returns a CSV error if the reader itself fails.
pub fn process_feed<R: Read>(engine: &Engine, reader: R) -> Result<usize, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut accepted = 0;
    for (line, result) in rdr.deserialize::<FeedRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(e),
            Err(e) => {
                warn!(line = line + 2, error = %e, "skipping malformed feed row");
                continue;
            }
        };
        match engine.process(row.into_record()) {
            Ok(_) => accepted += 1,
            Err(e) => warn!(line = line + 2, error = %e, "skipping feed row"),
        }
    }
    Ok(accepted)
}

#[derive(Debug, Serialize)]
struct SubscriptionReport {
    id: u64,
    user: u64,
    service: String,
    state: &'static str,
    paid_until: Option<NaiveDate>,
    days_left: i64,
    reference_number: Option<String>,
}

/// Writes the subscription table.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_subscriptions<W: Write>(
    store: &MemoryStore,
    today: NaiveDate,
    writer: W,
) -> Result<(), csv::Error> {
    use membership_ledger_rs::store::ServiceRepository;

    let mut wtr = Writer::from_writer(writer);
    for subscription in store.subscriptions() {
        let service = ServiceRepository::get(store, subscription.service)
            .map_or_else(|| subscription.service.to_string(), |s| s.name);
        wtr.serialize(SubscriptionReport {
            id: subscription.id.0,
            user: subscription.user.0,
            service,
            state: subscription.state.as_str(),
            paid_until: subscription.paid_until,
            days_left: subscription.days_left(today),
            reference_number: subscription.reference_number.map(|r| r.to_string()),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct ReservationReport {
    id: u64,
    user: u64,
    unit: u64,
    status: &'static str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    total_paid_months: u32,
    active: bool,
    reference_number: Option<String>,
}

/// Writes the reservation table.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_reservations<W: Write>(
    store: &MemoryStore,
    today: NaiveDate,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for reservation in store.reservations() {
        wtr.serialize(ReservationReport {
            id: reservation.id.0,
            user: reservation.user.0,
            unit: reservation.unit.0,
            status: reservation.status.as_str(),
            start_date: reservation.start_date,
            end_date: reservation.end_date,
            total_paid_months: reservation.total_paid_months,
            active: reservation.is_active(today),
            reference_number: reservation.reference_number.map(|r| r.to_string()),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use membership_ledger_rs::{ServiceId, StorageServiceId, SubscriptionId, SubscriptionState};
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Engine) {
        let store = Arc::new(MemoryStore::new());
        let services = "id,name,cost,cost_min,cost_max,days_per_payment,days_bonus_for_first,days_before_warning,days_until_suspending,pays_also_service\n\
                        1,Access,30,,,30,0,,,\n";
        for service in read_rows::<Service, _>(Cursor::new(services)).unwrap() {
            store.add_service(service);
        }
        store.add_member(Member {
            id: UserId(1),
            name: "Ada".into(),
            email: None,
        });
        let subscriptions = "id,user,service,state,paid_until,reference_number,last_payment,disable_on_expiry\n\
                             1,1,1,OVERDUE,,1232,,false\n";
        for subscription in read_rows::<Subscription, _>(Cursor::new(subscriptions)).unwrap() {
            store.restore_subscription(subscription);
        }
        let engine = Engine::new(
            Stores::from_shared(store.clone()),
            Arc::new(FixedClock::new(today())),
            Arc::new(Outbox::new()),
            LedgerConfig::default(),
        );
        (store, engine)
    }

    #[test]
    fn snapshot_rows_deserialize() {
        let (store, _) = setup();
        let subscription = &store.subscriptions()[0];
        assert_eq!(subscription.id, SubscriptionId(1));
        assert_eq!(subscription.service, ServiceId(1));
        assert_eq!(subscription.state, SubscriptionState::Overdue);
        assert!(subscription.paid_until.is_none());
    }

    #[test]
    fn feed_pays_subscription() {
        let (store, engine) = setup();
        let feed = "date,amount,reference,sender,archival_reference\n\
                    2025-03-01,30.00,1232,Ada,A1\n";

        assert_eq!(process_feed(&engine, Cursor::new(feed)).unwrap(), 1);

        let subscription = &store.subscriptions()[0];
        assert_eq!(subscription.state, SubscriptionState::Active);
        assert_eq!(
            subscription.paid_until,
            NaiveDate::from_ymd_opt(2025, 3, 31)
        );
    }

    #[test]
    fn feed_skips_malformed_and_duplicate_rows() {
        let (store, engine) = setup();
        let feed = "date,amount,reference,sender,archival_reference\n\
                    not-a-date,30.00,1232,Ada,A1\n\
                    2025-03-01,10.00,1232,Ada,A2\n\
                    2025-03-01,10.00,1232,Ada,A2\n\
                    2025-03-01,-5.00,,,\n";

        assert_eq!(process_feed(&engine, Cursor::new(feed)).unwrap(), 1);
        assert_eq!(store.transactions().len(), 1);
        assert!(store.subscriptions()[0].paid_until.is_none());
    }

    #[test]
    fn subscription_report_has_days_left() {
        let (store, engine) = setup();
        engine
            .process(FeedRecord::new(today(), dec!(30), Some("1232")))
            .unwrap();

        let mut out = Vec::new();
        write_subscriptions(&store, today(), &mut out).unwrap();
        let csv = String::from_utf8(out).unwrap();
        assert_eq!(
            csv,
            "id,user,service,state,paid_until,days_left,reference_number\n\
             1,1,Access,ACTIVE,2025-03-31,30,1232\n"
        );
    }

    #[test]
    fn reservation_report_flags_active_rows() {
        let (store, engine) = setup();
        store.add_storage_service(StorageService {
            id: StorageServiceId(1),
            name: "Shelves".into(),
            pending_payment_days: 5,
        });
        store.add_unit(StorageUnit {
            id: UnitId(1),
            service: StorageServiceId(1),
            name: "Shelf A1".into(),
            is_disabled: false,
            price_per_month: dec!(50),
            max_rental_months: None,
        });
        let reservation = engine
            .reservations()
            .create_reservation(UserId(1), UnitId(1), today())
            .unwrap();
        let reference = reservation.reference_number.unwrap();
        engine
            .process(FeedRecord::new(today(), dec!(100), Some(reference.as_str())))
            .unwrap();

        let mut out = Vec::new();
        write_reservations(&store, today(), &mut out).unwrap();
        let csv = String::from_utf8(out).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("id,user,unit,status,start_date,end_date,total_paid_months,active,reference_number")
        );
        assert_eq!(
            lines.next(),
            Some(format!("1,1,1,ACTIVE,2025-03-01,2025-05-01,2,true,{reference}").as_str())
        );
    }
}
