//! Facade bundling the fulfillment components over one store.

use std::sync::Arc;

use store::Store;

use crate::assignment::AssignmentCoordinator;
use crate::config::FeeSchedule;
use crate::events::NotificationSink;
use crate::ledger::Ledger;
use crate::order::OrderStateMachine;
use crate::payout::PayoutProcessor;
use crate::settlement::SettlementEngine;

/// All fulfillment components sharing a store, fee schedule and sink.
///
/// Cloning is cheap when the store is, which is how the HTTP layer hands
/// it to every request.
#[derive(Clone)]
pub struct FulfillmentService<S: Store + Clone> {
    orders: OrderStateMachine<S>,
    assignments: AssignmentCoordinator<S>,
    ledger: Ledger<S>,
    settlements: SettlementEngine<S>,
    payouts: PayoutProcessor<S>,
}

impl<S: Store + Clone> FulfillmentService<S> {
    pub fn new(store: S, fees: FeeSchedule, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            orders: OrderStateMachine::new(store.clone(), fees.clone(), sink.clone()),
            assignments: AssignmentCoordinator::new(store.clone(), sink),
            ledger: Ledger::new(store.clone()),
            settlements: SettlementEngine::new(store.clone(), fees),
            payouts: PayoutProcessor::new(store),
        }
    }

    pub fn orders(&self) -> &OrderStateMachine<S> {
        &self.orders
    }

    pub fn assignments(&self) -> &AssignmentCoordinator<S> {
        &self.assignments
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn settlements(&self) -> &SettlementEngine<S> {
        &self.settlements
    }

    pub fn payouts(&self) -> &PayoutProcessor<S> {
        &self.payouts
    }
}
