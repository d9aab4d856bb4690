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

//! Subscription ledger integration tests.

use chrono::{Duration, NaiveDate};
use membership_ledger_rs::reference;
use membership_ledger_rs::store::{
    InvoiceRepository, MemberDirectory, ServiceRepository, SubscriptionRepository,
    TransactionRepository,
};
use membership_ledger_rs::{
    BankTransaction, BillingEngine, CascadeMode, FeedRecord, FixedClock, LedgerConfig,
    LedgerError, Member, MemoryStore, Outbox, ReferenceNumber, Service, ServiceId, StateObserver,
    Stores, Subscription, SubscriptionId, SubscriptionState, UserId,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const USER: UserId = UserId(1);
const PARENT: ServiceId = ServiceId(1);
const CHILD: ServiceId = ServiceId(2);
const GRANDCHILD: ServiceId = ServiceId(3);

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
}

fn make_reference(base: u64) -> ReferenceNumber {
    ReferenceNumber::from(reference::generate(base).unwrap())
}

fn make_service(id: ServiceId, name: &str, cost: Decimal, days: i64, bonus: i64) -> Service {
    let mut service = Service::new(id, name, cost, days);
    service.days_bonus_for_first = bonus;
    service
}

fn make_subscription(id: u64, service: ServiceId, state: SubscriptionState, reference: u64) -> Subscription {
    let mut subscription = Subscription::new(SubscriptionId(id), USER, service);
    subscription.state = state;
    subscription.reference_number = Some(make_reference(reference));
    subscription
}

#[derive(Default)]
struct RecordingObserver {
    seen: Mutex<Vec<(SubscriptionId, SubscriptionState, SubscriptionState)>>,
}

impl StateObserver for RecordingObserver {
    fn subscription_state_changed(
        &self,
        subscription: &Subscription,
        from: SubscriptionState,
        to: SubscriptionState,
    ) {
        self.seen.lock().push((subscription.id, from, to));
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    outbox: Arc<Outbox>,
    observer: Arc<RecordingObserver>,
    billing: BillingEngine,
}

impl Fixture {
    fn new(mode: CascadeMode) -> Self {
        let store = Arc::new(MemoryStore::new());
        store.add_member(Member {
            id: USER,
            name: "FirstName LastName".into(),
            email: Some("user1@example.com".into()),
        });

        let mut parent = make_service(PARENT, "parent_service", dec!(30), 30, 10);
        parent.pays_also_service = Some(CHILD);
        let mut child = make_service(CHILD, "child_service", dec!(10), 60, 20);
        child.pays_also_service = Some(GRANDCHILD);
        let grandchild = make_service(GRANDCHILD, "grandchild_service", dec!(10), 70, 20);
        store.add_service(parent);
        store.add_service(child);
        store.add_service(grandchild);

        store.restore_subscription(make_subscription(1, PARENT, SubscriptionState::Active, 123));
        store.restore_subscription(make_subscription(2, CHILD, SubscriptionState::Active, 456));
        store.restore_subscription(make_subscription(3, GRANDCHILD, SubscriptionState::Active, 789));

        let outbox = Arc::new(Outbox::new());
        let observer = Arc::new(RecordingObserver::default());
        let billing = BillingEngine::new(
            Stores::from_shared(store.clone()),
            Arc::new(FixedClock::new(today())),
            outbox.clone(),
            LedgerConfig::default().with_cascade_mode(mode),
        )
        .with_observer(observer.clone());

        Fixture {
            store,
            outbox,
            observer,
            billing,
        }
    }

    fn receive(&self, date: NaiveDate, amount: Decimal, reference: &ReferenceNumber) -> BankTransaction {
        let record = FeedRecord::new(date, amount, Some(reference.as_str()));
        let transaction = TransactionRepository::insert(self.store.as_ref(), record).unwrap();
        self.billing.new_transaction(&transaction);
        transaction
    }

    fn subscription(&self, id: u64) -> Option<Subscription> {
        SubscriptionRepository::get(self.store.as_ref(), SubscriptionId(id))
    }

    fn transaction(&self, transaction: &BankTransaction) -> BankTransaction {
        TransactionRepository::get(self.store.as_ref(), transaction.id).unwrap()
    }

    fn days_left(&self, reference: &ReferenceNumber) -> i64 {
        let subscription = match SubscriptionRepository::by_reference(self.store.as_ref(), reference).pop() {
            Some(subscription) => subscription,
            None => {
                let invoice = InvoiceRepository::by_reference(self.store.as_ref(), reference)
                    .pop()
                    .unwrap();
                SubscriptionRepository::get(self.store.as_ref(), invoice.subscription).unwrap()
            }
        };
        subscription.days_left(today())
    }

    /// Pays `amounts` to `refs[0]`, dated from yesterday onwards, and
    /// returns the days left of every reference after each payment.
    fn payment(&self, amounts: &[Decimal], refs: &[ReferenceNumber]) -> Vec<Vec<i64>> {
        let mut results = vec![Vec::new(); refs.len()];
        for (n, amount) in amounts.iter().enumerate() {
            let date = today() + Duration::days(n as i64 - 1);
            self.receive(date, *amount, &refs[0]);
            self.billing.update_user(USER);
            for (row, reference) in results.iter_mut().zip(refs) {
                row.push(self.days_left(reference));
            }
        }
        results
    }
}

fn parent_ref() -> ReferenceNumber {
    make_reference(123)
}

fn child_ref() -> ReferenceNumber {
    make_reference(456)
}

fn grandchild_ref() -> ReferenceNumber {
    make_reference(789)
}

#[test]
fn chained_parent_payment_pays_whole_chain() {
    let fixture = Fixture::new(CascadeMode::Chained);
    let refs = [parent_ref(), child_ref(), grandchild_ref()];

    let results = fixture.payment(&[dec!(15), dec!(30), dec!(30), dec!(30), dec!(15)], &refs);

    assert_eq!(results[0], vec![0, 40, 70, 100, 100]);
    assert_eq!(results[1], vec![0, 90, 100, 130, 130]);
    assert_eq!(results[2], vec![0, 120, 120, 140, 140]);
}

#[test]
fn chained_invoice_payment_continues_chain() {
    let fixture = Fixture::new(CascadeMode::Chained);
    fixture.payment(
        &[dec!(15), dec!(30), dec!(30), dec!(30), dec!(15)],
        &[parent_ref(), child_ref(), grandchild_ref()],
    );

    let invoice = fixture
        .billing
        .create_invoice(SubscriptionId(1), 100, dec!(120))
        .unwrap();
    let invoice_ref = invoice.reference_number.clone().unwrap();

    let results = fixture.payment(
        &[dec!(50), dec!(120), dec!(120), dec!(120), dec!(50)],
        &[invoice_ref, child_ref(), grandchild_ref()],
    );

    assert_eq!(results[0], vec![100, 200, 200, 200, 200]);
    assert_eq!(results[1], vec![130, 230, 230, 230, 230]);
    assert_eq!(results[2], vec![140, 240, 240, 240, 240]);

    // Only one of the sufficient transactions paid the invoice.
    let paid = InvoiceRepository::get(fixture.store.as_ref(), invoice.id).unwrap();
    assert!(paid.is_paid());
    let unused = fixture.store.transactions().iter().filter(|t| !t.has_been_used).count();
    assert_eq!(unused, 2 + 4);
}

#[test]
fn transaction_date_cascade_is_single_level() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let refs = [parent_ref(), child_ref(), grandchild_ref()];

    let results = fixture.payment(&[dec!(15), dec!(30), dec!(30), dec!(30), dec!(15)], &refs);

    assert_eq!(results[0], vec![0, 40, 70, 100, 100]);
    assert_eq!(results[1], vec![0, 60, 61, 62, 62]);
    assert_eq!(results[2], vec![0, 0, 0, 0, 0]);
}

#[test]
fn transaction_date_mode_does_not_cascade_invoices() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let invoice = fixture
        .billing
        .create_invoice(SubscriptionId(1), 100, dec!(120))
        .unwrap();

    fixture.receive(today(), dec!(120), invoice.reference_number.as_ref().unwrap());
    let result = fixture.billing.update_user(USER);

    assert_eq!(result.invoices_paid, 1);
    assert_eq!(fixture.days_left(&parent_ref()), 100);
    assert_eq!(fixture.days_left(&child_ref()), 0);
}

#[test]
fn child_payment_blocked_while_parent_subscribed() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);

    let results = fixture.payment(&[dec!(5), dec!(10), dec!(10), dec!(10), dec!(5)], &[child_ref()]);

    assert_eq!(results[0], vec![0, 0, 0, 0, 0]);
    assert!(fixture.store.transactions().iter().all(|t| !t.has_been_used));
}

#[test]
fn child_payment_after_parent_removed() {
    for mode in [CascadeMode::TransactionDate, CascadeMode::Chained] {
        let fixture = Fixture::new(mode);
        assert!(SubscriptionRepository::delete(fixture.store.as_ref(), SubscriptionId(1)));

        let results =
            fixture.payment(&[dec!(5), dec!(10), dec!(10), dec!(10), dec!(5)], &[child_ref()]);

        assert_eq!(results[0], vec![0, 80, 140, 200, 200], "{mode:?}");
    }
}

#[test]
fn cost_min_lowers_payment_threshold() {
    let fixture = Fixture::new(CascadeMode::Chained);
    let mut parent = make_service(PARENT, "parent_service", dec!(30), 30, 10);
    parent.pays_also_service = Some(CHILD);
    parent.cost_min = Some(dec!(15));
    fixture.store.add_service(parent);

    let results = fixture.payment(&[dec!(10), dec!(15), dec!(30), dec!(15), dec!(10)], &[parent_ref()]);

    assert_eq!(results[0], vec![0, 40, 70, 100, 100]);
}

#[test]
fn update_user_is_idempotent() {
    let fixture = Fixture::new(CascadeMode::Chained);
    fixture.payment(
        &[dec!(15), dec!(30), dec!(30)],
        &[parent_ref(), child_ref(), grandchild_ref()],
    );
    let before: Vec<Subscription> = fixture.store.subscriptions();

    let again = fixture.billing.update_user(USER);

    assert!(again.is_empty());
    assert_eq!(fixture.store.subscriptions(), before);
}

#[test]
fn insufficient_transaction_is_annotated_and_kept() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let transaction = fixture.receive(today(), dec!(15), &parent_ref());

    fixture.billing.update_user(USER);

    let stored = fixture.transaction(&transaction);
    assert!(!stored.has_been_used);
    assert_eq!(stored.user, Some(USER));
    assert!(stored.comment.unwrap().contains("less than the minimum payment 30"));
    assert!(fixture.subscription(1).unwrap().paid_until.is_none());
}

#[test]
fn first_payment_adds_bonus_later_payments_extend() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let first_date = today() - Duration::days(5);

    fixture.receive(first_date, dec!(30), &parent_ref());
    fixture.billing.update_user(USER);
    assert_eq!(
        fixture.subscription(1).unwrap().paid_until,
        Some(first_date + Duration::days(40))
    );

    // Later payments extend from paid_until, whatever their date.
    fixture.receive(today() + Duration::days(20), dec!(30), &parent_ref());
    fixture.billing.update_user(USER);
    assert_eq!(
        fixture.subscription(1).unwrap().paid_until,
        Some(first_date + Duration::days(70))
    );
}

#[test]
fn suspended_subscription_is_never_paid() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let mut parent = fixture.subscription(1).unwrap();
    parent.state = SubscriptionState::Suspended;
    SubscriptionRepository::update(fixture.store.as_ref(), &parent);

    let transaction = fixture.receive(today(), dec!(30), &parent_ref());
    fixture.billing.update_user(USER);

    assert!(!fixture.transaction(&transaction).has_been_used);
    let parent = fixture.subscription(1).unwrap();
    assert_eq!(parent.state, SubscriptionState::Suspended);
    assert!(parent.paid_until.is_none());
}

#[test]
fn suspended_downstream_is_skipped_by_cascade() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let mut child = fixture.subscription(2).unwrap();
    child.state = SubscriptionState::Suspended;
    SubscriptionRepository::update(fixture.store.as_ref(), &child);

    fixture.receive(today(), dec!(30), &parent_ref());
    fixture.billing.update_user(USER);

    assert_eq!(fixture.days_left(&parent_ref()), 40);
    assert!(fixture.subscription(2).unwrap().paid_until.is_none());
}

#[test]
fn expired_subscription_goes_overdue_and_notifies_observer() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let mut parent = fixture.subscription(1).unwrap();
    parent.paid_until = Some(today() - Duration::days(1));
    SubscriptionRepository::update(fixture.store.as_ref(), &parent);

    let result = fixture.billing.update_user(USER);

    assert_eq!(result.state_changes, 1);
    assert_eq!(fixture.subscription(1).unwrap().state, SubscriptionState::Overdue);
    assert_eq!(
        *fixture.observer.seen.lock(),
        vec![(SubscriptionId(1), SubscriptionState::Active, SubscriptionState::Overdue)]
    );
    let history = fixture.store.history(USER);
    assert_eq!(
        history.last().unwrap().message,
        "Service parent_service state changed from ACTIVE to OVERDUE"
    );
}

#[test]
fn overdue_past_grace_period_is_suspended() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let mut parent = make_service(PARENT, "parent_service", dec!(30), 30, 10);
    parent.days_until_suspending = Some(10);
    fixture.store.add_service(parent);
    let mut subscription = fixture.subscription(1).unwrap();
    subscription.paid_until = Some(today() - Duration::days(11));
    SubscriptionRepository::update(fixture.store.as_ref(), &subscription);

    fixture.billing.update_user(USER);

    assert_eq!(fixture.subscription(1).unwrap().state, SubscriptionState::Suspended);
    assert_eq!(fixture.observer.seen.lock().len(), 2);
}

#[test]
fn payment_reactivates_overdue_subscription() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let mut parent = fixture.subscription(1).unwrap();
    parent.state = SubscriptionState::Overdue;
    parent.paid_until = Some(today() - Duration::days(3));
    SubscriptionRepository::update(fixture.store.as_ref(), &parent);

    fixture.receive(today(), dec!(30), &parent_ref());
    fixture.billing.update_user(USER);

    let parent = fixture.subscription(1).unwrap();
    assert_eq!(parent.state, SubscriptionState::Active);
    assert_eq!(parent.days_left(today()), 27);
}

#[test]
fn disable_on_expiry_removes_subscription() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let mut parent = fixture.subscription(1).unwrap();
    parent.paid_until = Some(today() - Duration::days(1));
    SubscriptionRepository::update(fixture.store.as_ref(), &parent);
    fixture
        .billing
        .set_disable_on_expiry(SubscriptionId(1), true)
        .unwrap();

    fixture.billing.update_user(USER);

    assert!(fixture.subscription(1).is_none());
    assert!(fixture.observer.seen.lock().is_empty());
}

#[test]
fn direct_payment_clears_disable_on_expiry() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    fixture
        .billing
        .set_disable_on_expiry(SubscriptionId(1), true)
        .unwrap();

    fixture.receive(today(), dec!(30), &parent_ref());
    fixture.billing.update_user(USER);

    assert!(!fixture.subscription(1).unwrap().disable_on_expiry);
    assert_eq!(
        fixture.billing.set_disable_on_expiry(SubscriptionId(99), true),
        Err(LedgerError::SubscriptionNotFound(SubscriptionId(99)))
    );
}

#[test]
fn insufficient_invoice_payment_leaves_invoice_open() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let invoice = fixture
        .billing
        .create_invoice(SubscriptionId(1), 100, dec!(120))
        .unwrap();
    let transaction = fixture.receive(today(), dec!(119.99), invoice.reference_number.as_ref().unwrap());

    let result = fixture.billing.update_user(USER);

    assert_eq!(result.invoices_paid, 0);
    assert!(!InvoiceRepository::get(fixture.store.as_ref(), invoice.id).unwrap().is_paid());
    let stored = fixture.transaction(&transaction);
    assert!(!stored.has_been_used);
    assert!(stored.comment.is_some());
}

#[test]
fn invoice_for_unpaid_subscription_starts_at_transaction_date() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let invoice = fixture
        .billing
        .create_invoice(SubscriptionId(3), 45, dec!(20))
        .unwrap();
    let paid_on = today() - Duration::days(2);

    fixture.receive(paid_on, dec!(25), invoice.reference_number.as_ref().unwrap());
    fixture.billing.update_user(USER);

    let grandchild = fixture.subscription(3).unwrap();
    assert_eq!(grandchild.paid_until, Some(paid_on + Duration::days(45)));
    assert!(grandchild.last_payment.is_some());
}

#[test]
fn invoice_with_missing_subscription_is_skipped() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let invoice = fixture
        .billing
        .create_invoice(SubscriptionId(1), 100, dec!(120))
        .unwrap();
    SubscriptionRepository::delete(fixture.store.as_ref(), SubscriptionId(1));
    let transaction = fixture.receive(today(), dec!(120), invoice.reference_number.as_ref().unwrap());

    fixture.billing.update_user(USER);

    assert!(!InvoiceRepository::get(fixture.store.as_ref(), invoice.id).unwrap().is_paid());
    assert!(!fixture.transaction(&transaction).has_been_used);
}

#[test]
fn invoice_pays_subscription_with_missing_service() {
    let fixture = Fixture::new(CascadeMode::Chained);
    fixture
        .store
        .restore_subscription(make_subscription(4, ServiceId(9), SubscriptionState::Active, 321));
    let invoice = fixture
        .billing
        .create_invoice(SubscriptionId(4), 30, dec!(25))
        .unwrap();
    let transaction = fixture.receive(today(), dec!(25), invoice.reference_number.as_ref().unwrap());

    let result = fixture.billing.update_user(USER);

    assert_eq!(result.invoices_paid, 1);
    assert_eq!(
        InvoiceRepository::get(fixture.store.as_ref(), invoice.id).unwrap().payment_transaction,
        Some(transaction.id)
    );
    assert_eq!(fixture.subscription(4).unwrap().paid_until, Some(today() + Duration::days(30)));
}

#[test]
fn shared_invoice_reference_pays_newest_invoice() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let older = fixture
        .billing
        .create_invoice(SubscriptionId(1), 100, dec!(120))
        .unwrap();
    let newer = fixture
        .billing
        .create_invoice(SubscriptionId(3), 45, dec!(20))
        .unwrap();
    let reference = older.reference_number.clone().unwrap();
    InvoiceRepository::set_reference(fixture.store.as_ref(), newer.id, reference.clone());
    fixture.receive(today(), dec!(120), &reference);

    let result = fixture.billing.update_user(USER);

    assert_eq!(result.invoices_paid, 1);
    assert!(!InvoiceRepository::get(fixture.store.as_ref(), older.id).unwrap().is_paid());
    assert!(InvoiceRepository::get(fixture.store.as_ref(), newer.id).unwrap().is_paid());
    assert!(fixture.subscription(1).unwrap().paid_until.is_none());
    assert_eq!(fixture.subscription(3).unwrap().paid_until, Some(today() + Duration::days(45)));
}

#[test]
fn create_invoice_validates_input() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    assert_eq!(
        fixture.billing.create_invoice(SubscriptionId(1), 10, dec!(0)),
        Err(LedgerError::InvalidAmount)
    );
    assert_eq!(
        fixture.billing.create_invoice(SubscriptionId(42), 10, dec!(10)),
        Err(LedgerError::SubscriptionNotFound(SubscriptionId(42)))
    );
}

#[test]
fn new_transaction_matches_newest_duplicate() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    fixture.store.add_member(Member {
        id: UserId(2),
        name: "Other".into(),
        email: None,
    });
    let mut duplicate = make_subscription(10, PARENT, SubscriptionState::Active, 123);
    duplicate.user = UserId(2);
    fixture.store.restore_subscription(duplicate);

    let transaction = fixture.receive(today(), dec!(30), &parent_ref());

    assert_eq!(fixture.transaction(&transaction).user, Some(UserId(2)));
}

#[test]
fn recalculate_payments_pays_newest_duplicate() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    fixture.store.add_member(Member {
        id: UserId(2),
        name: "Other".into(),
        email: None,
    });
    let mut duplicate = make_subscription(10, PARENT, SubscriptionState::Active, 123);
    duplicate.user = UserId(2);
    fixture.store.restore_subscription(duplicate);
    let record = FeedRecord::new(today(), dec!(30), Some(parent_ref().as_str()));
    let transaction = TransactionRepository::insert(fixture.store.as_ref(), record).unwrap();

    assert_eq!(fixture.billing.recalculate_payments(), 1);

    let stored = fixture.transaction(&transaction);
    assert_eq!(stored.user, Some(UserId(2)));
    assert!(stored.has_been_used);
    assert!(fixture.subscription(1).unwrap().paid_until.is_none());
    assert_eq!(
        fixture.subscription(10).unwrap().paid_until,
        Some(today() + Duration::days(40))
    );
}

#[test]
fn new_transaction_ignores_unknown_references() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let record = FeedRecord::new(today(), dec!(30), None);
    let anonymous = TransactionRepository::insert(fixture.store.as_ref(), record).unwrap();
    assert!(fixture.billing.new_transaction(&anonymous).is_none());

    let unknown = fixture.receive(today(), dec!(30), &make_reference(999));
    assert!(fixture.transaction(&unknown).user.is_none());
    assert!(fixture.store.history(USER).is_empty());
}

#[test]
fn subscribe_creates_suspended_subscription_with_reference() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);

    let subscription = fixture.billing.subscribe(USER, CHILD).unwrap();

    assert_eq!(subscription.state, SubscriptionState::Suspended);
    let reference: u64 = subscription.reference_number.unwrap().as_str().parse().unwrap();
    assert!(reference::is_valid(reference));
    assert_eq!(
        fixture.billing.subscribe(UserId(7), CHILD),
        Err(LedgerError::MemberNotFound(UserId(7)))
    );
    assert_eq!(
        fixture.billing.subscribe(USER, ServiceId(7)),
        Err(LedgerError::ServiceNotFound(ServiceId(7)))
    );
}

#[test]
fn accept_application_applies_waiting_payment() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    fixture.store.add_member(Member {
        id: UserId(2),
        name: "Applicant".into(),
        email: None,
    });
    let applicant = UserId(2);
    fixture.store.add_service(make_service(ServiceId(9), "membership", dec!(20), 365, 0));
    let subscription = fixture.billing.subscribe(applicant, ServiceId(9)).unwrap();
    let reference = subscription.reference_number.clone().unwrap();

    fixture.receive(today(), dec!(20), &reference);
    assert!(fixture.billing.update_user(applicant).is_empty());

    let result = fixture.billing.accept_application(applicant).unwrap();

    assert_eq!(result.payments_applied, 1);
    let accepted = SubscriptionRepository::get(fixture.store.as_ref(), subscription.id).unwrap();
    assert_eq!(accepted.state, SubscriptionState::Active);
    assert_eq!(accepted.days_left(today()), 365);
    assert!(
        fixture
            .store
            .history(applicant)
            .iter()
            .any(|entry| entry.message == "Accepted as member")
    );
}

#[test]
fn recalculate_payments_matches_stored_transactions() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let record = FeedRecord::new(today(), dec!(30), Some(parent_ref().as_str()));
    TransactionRepository::insert(fixture.store.as_ref(), record).unwrap();

    assert_eq!(fixture.billing.recalculate_payments(), 1);
    assert_eq!(fixture.days_left(&parent_ref()), 40);
}

#[test]
fn reset_member_rebuilds_from_feed() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    fixture.payment(&[dec!(30), dec!(30)], &[parent_ref()]);
    let paid_until = fixture.subscription(1).unwrap().paid_until;

    fixture.billing.reset_member(USER).unwrap();

    let parent = fixture.subscription(1).unwrap();
    assert_eq!(parent.state, SubscriptionState::Overdue);
    assert!(parent.paid_until.is_none());
    assert!(fixture.store.transactions().iter().all(|t| !t.has_been_used && t.user.is_none()));
    let history = fixture.store.history(USER);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].message, "Payment history begins");

    fixture.billing.update_user(USER);
    assert_eq!(fixture.subscription(1).unwrap().paid_until, paid_until);
    assert_eq!(fixture.subscription(1).unwrap().state, SubscriptionState::Active);
}

#[test]
fn expiring_subscriptions_are_notified() {
    let fixture = Fixture::new(CascadeMode::TransactionDate);
    let mut parent = make_service(PARENT, "parent_service", dec!(30), 30, 10);
    parent.days_before_warning = Some(7);
    fixture.store.add_service(parent);
    let mut subscription = fixture.subscription(1).unwrap();
    subscription.paid_until = Some(today() + Duration::days(7));
    SubscriptionRepository::update(fixture.store.as_ref(), &subscription);

    assert_eq!(fixture.billing.find_expiring_subscriptions().len(), 1);
    assert_eq!(fixture.billing.notify_expiring_subscriptions(), 1);

    let sent = fixture.outbox.drain();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, USER);
    assert_eq!(sent[0].template, "service_expiring");
    assert_eq!(sent[0].context["days_left"], 7);
    assert_eq!(sent[0].context["service"], "parent_service");
    assert_eq!(sent[0].context["period"], "30 days");

    // One day later the warning day has passed.
    subscription.paid_until = Some(today() + Duration::days(6));
    SubscriptionRepository::update(fixture.store.as_ref(), &subscription);
    assert!(fixture.billing.find_expiring_subscriptions().is_empty());
}

#[test]
fn payment_cycle_is_refused() {
    let fixture = Fixture::new(CascadeMode::Chained);
    let mut grandchild = make_service(GRANDCHILD, "grandchild_service", dec!(10), 70, 20);
    grandchild.pays_also_service = Some(PARENT);
    fixture.store.add_service(grandchild);
    let parent = ServiceRepository::get(fixture.store.as_ref(), PARENT).unwrap();

    assert_eq!(
        fixture.billing.payment_chain(&parent),
        Err(LedgerError::CascadeCycle(PARENT))
    );

    // Without the grandchild subscription nothing pays for the parent, so
    // the direct payment lands and only the cascade is refused.
    SubscriptionRepository::delete(fixture.store.as_ref(), SubscriptionId(3));
    fixture.receive(today(), dec!(30), &parent_ref());
    fixture.billing.update_user(USER);
    assert_eq!(fixture.days_left(&parent_ref()), 40);
    assert_eq!(fixture.days_left(&child_ref()), 0);
}
