use crate::{
    dispatch::{ChangeDispatcher, DispatchSummary, ListenerHandle},
    entities::ModbusEntity,
    registers::{Address, ReadOperation, ReadPlan, RegisterType},
    transport::{RegisterTransport, TransportError},
};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, PoisonError, RwLock},
};
use tokio::time::{self, Duration};

/// Register cache of one inverter plus the listeners that decode it.
pub struct EntityController {
    register_type: RegisterType,
    values: RwLock<HashMap<Address, u16>>,
    dispatcher: ChangeDispatcher,
}

impl EntityController {
    pub fn new(register_type: RegisterType) -> Self {
        Self {
            register_type,
            values: RwLock::new(HashMap::new()),
            dispatcher: ChangeDispatcher::new(),
        }
    }

    pub fn register_type(&self) -> RegisterType {
        self.register_type
    }

    pub fn dispatcher(&self) -> &ChangeDispatcher {
        &self.dispatcher
    }

    pub fn value(&self, address: Address) -> Option<u16> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&address)
            .copied()
    }

    pub fn add_update_listener(&self, entity: &Arc<ModbusEntity>) -> ListenerHandle {
        self.dispatcher.register(entity.descriptor().address, entity)
    }

    pub fn remove_update_listener(&self, entity: &ModbusEntity, handle: ListenerHandle) {
        self.dispatcher.unregister(entity.descriptor().address, handle);
    }

    /// Stores the result of `op` and returns the addresses whose value changed.
    ///
    /// A response shorter than requested only updates the registers it contains.
    pub fn apply_read(&self, op: ReadOperation, response: &[u16]) -> Vec<Address> {
        if response.len() != op.count as usize {
            tracing::warn!(
                start = op.start,
                requested = op.count,
                received = response.len(),
                "Inverter returned an unexpected number of registers"
            );
        }

        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);

        op.addresses()
            .zip(response)
            .filter_map(|(address, &value)| match values.insert(address, value) {
                Some(previous) if previous == value => None,
                _ => Some(address),
            })
            .collect()
    }

    pub fn notify(&self, changed: &HashSet<Address>) -> DispatchSummary {
        if changed.is_empty() {
            return DispatchSummary::default();
        }

        self.dispatcher.notify(changed)
    }

    /// Runs one polling cycle and refreshes every entity whose register changed.
    ///
    /// Each read gets `request_timeout` to answer. If a read fails or times out, whatever changed
    /// before it is still dispatched.
    pub async fn poll<T: RegisterTransport>(
        &self,
        transport: &mut T,
        plan: ReadPlan<'_>,
        request_timeout: Duration,
    ) -> Result<DispatchSummary, TransportError> {
        let mut changed = HashSet::new();
        let mut failure = None;

        for op in plan {
            let outcome = time::timeout(request_timeout, transport.read(self.register_type, op.start, op.count)).await;
            let response = match outcome {
                Ok(response) => response,
                Err(_) => {
                    transport.reset();
                    Err(TransportError::Timeout(request_timeout))
                },
            };

            match response {
                Ok(response) => changed.extend(self.apply_read(op, &response)),
                Err(e) => {
                    failure = Some(e);
                    break;
                },
            }
        }

        let summary = self.notify(&changed);

        tracing::debug!(
            changed = changed.len(),
            notified = summary.notified,
            failed = summary.failed,
            "Polling cycle finished"
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    pub async fn write<T: RegisterTransport>(
        &self,
        transport: &mut T,
        address: Address,
        value: u16,
        request_timeout: Duration,
    ) -> Result<DispatchSummary, TransportError> {
        let outcome = time::timeout(request_timeout, transport.write(address, value)).await;
        match outcome {
            Ok(response) => response?,
            Err(_) => {
                transport.reset();
                return Err(TransportError::Timeout(request_timeout));
            },
        }

        let changed: HashSet<_> = self
            .apply_read(ReadOperation { start: address, count: 1 }, &[value])
            .into_iter()
            .collect();

        Ok(self.notify(&changed))
    }
}
