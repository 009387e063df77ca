//! In-memory register bank transport
//!
//! Serves reads from two sparse banks (unset registers read as 0) and
//! records every request. Failures can be scripted per address, as a queue
//! of one-shot errors, or as a budget of refused connects. A
//! [`SimulatedHandle`] shares the state so tests can seed and inspect the
//! device while a client owns the transport.

use super::{ExceptionCode, Transport, TransportError, TransportResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bank {
    Input,
    Holding,
}

/// One request as seen by the simulated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Read {
        bank: Bank,
        address: u16,
        count: u16,
        unit: u8,
    },
    Write {
        address: u16,
        words: Vec<u16>,
        unit: u8,
    },
}

#[derive(Debug, Default)]
struct SimState {
    connected: bool,
    connect_attempts: u32,
    refused_connects: u32,
    input: HashMap<u16, u16>,
    holding: HashMap<u16, u16>,
    address_failures: HashMap<(Bank, u16), TransportError>,
    next_failures: VecDeque<TransportError>,
    requests: Vec<Request>,
}

impl SimState {
    fn bank(&self, bank: Bank) -> &HashMap<u16, u16> {
        match bank {
            Bank::Input => &self.input,
            Bank::Holding => &self.holding,
        }
    }

    fn check_request(&mut self, bank: Bank, address: u16, count: u16) -> TransportResult<()> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if let Some(err) = self.next_failures.pop_front() {
            return Err(err);
        }
        if address.checked_add(count).is_none() {
            return Err(TransportError::Exception(ExceptionCode::ILLEGAL_DATA_ADDRESS));
        }
        let scripted = (address..address + count)
            .find_map(|a| self.address_failures.get(&(bank, a)).cloned());
        match scripted {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub struct SimulatedTransport {
    name: String,
    state: Arc<RwLock<SimState>>,
}

impl SimulatedTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(SimState::default())),
        }
    }

    /// Transport with pre-seeded banks, keyed by wire address
    pub fn with_registers(
        name: impl Into<String>,
        input: HashMap<u16, u16>,
        holding: HashMap<u16, u16>,
    ) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(SimState {
                input,
                holding,
                ..SimState::default()
            })),
        }
    }

    pub fn handle(&self) -> SimulatedHandle {
        SimulatedHandle {
            state: Arc::clone(&self.state),
        }
    }

    async fn read(&mut self, bank: Bank, address: u16, count: u16, unit: u8) -> TransportResult<Vec<u16>> {
        let mut state = self.state.write().await;
        state.requests.push(Request::Read {
            bank,
            address,
            count,
            unit,
        });
        state.check_request(bank, address, count)?;

        let registers = state.bank(bank);
        let words = (address..address + count)
            .map(|a| registers.get(&a).copied().unwrap_or(0))
            .collect::<Vec<_>>();
        debug!(
            "[{}] {:?} read unit {} address {} count {}: {:?}",
            self.name, bank, unit, address, count, words
        );
        Ok(words)
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn endpoint(&self) -> String {
        format!("simulated:{}", self.name)
    }

    fn is_connected(&self) -> bool {
        self.state
            .try_read()
            .map(|state| state.connected)
            .unwrap_or(false)
    }

    async fn connect(&mut self) -> TransportResult<()> {
        let mut state = self.state.write().await;
        state.connect_attempts += 1;
        if state.refused_connects > 0 {
            state.refused_connects -= 1;
            return Err(TransportError::Unreachable(format!(
                "{} refused the connection",
                self.name
            )));
        }
        state.connected = true;
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.state.write().await.connected = false;
        Ok(())
    }

    async fn read_input(&mut self, address: u16, count: u16, unit: u8) -> TransportResult<Vec<u16>> {
        self.read(Bank::Input, address, count, unit).await
    }

    async fn read_holding(&mut self, address: u16, count: u16, unit: u8) -> TransportResult<Vec<u16>> {
        self.read(Bank::Holding, address, count, unit).await
    }

    async fn write_holding(&mut self, address: u16, words: &[u16], unit: u8) -> TransportResult<()> {
        let mut state = self.state.write().await;
        state.requests.push(Request::Write {
            address,
            words: words.to_vec(),
            unit,
        });
        state.check_request(Bank::Holding, address, words.len() as u16)?;

        for (offset, &word) in words.iter().enumerate() {
            state.holding.insert(address + offset as u16, word);
        }
        debug!(
            "[{}] holding write unit {} address {}: {:?}",
            self.name, unit, address, words
        );
        Ok(())
    }
}

/// Shared view of a [`SimulatedTransport`]'s device state
#[derive(Clone)]
pub struct SimulatedHandle {
    state: Arc<RwLock<SimState>>,
}

impl SimulatedHandle {
    pub async fn set_input_words(&self, address: u16, words: &[u16]) {
        let mut state = self.state.write().await;
        for (offset, &word) in words.iter().enumerate() {
            state.input.insert(address + offset as u16, word);
        }
    }

    pub async fn set_holding_words(&self, address: u16, words: &[u16]) {
        let mut state = self.state.write().await;
        for (offset, &word) in words.iter().enumerate() {
            state.holding.insert(address + offset as u16, word);
        }
    }

    pub async fn holding_word(&self, address: u16) -> Option<u16> {
        self.state.read().await.holding.get(&address).copied()
    }

    /// Every request touching `address` in `bank` fails with `err`
    pub async fn fail_address(&self, bank: Bank, address: u16, err: TransportError) {
        self.state
            .write()
            .await
            .address_failures
            .insert((bank, address), err);
    }

    /// The next request fails with `err`
    pub async fn fail_next(&self, err: TransportError) {
        self.state.write().await.next_failures.push_back(err);
    }

    /// Refuse the next `count` connect attempts
    pub async fn refuse_connects(&self, count: u32) {
        self.state.write().await.refused_connects = count;
    }

    pub async fn connect_attempts(&self) -> u32 {
        self.state.read().await.connect_attempts
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }

    pub async fn requests(&self) -> Vec<Request> {
        self.state.read().await.requests.clone()
    }

    pub async fn writes(&self) -> Vec<(u16, Vec<u16>)> {
        self.state
            .read()
            .await
            .requests
            .iter()
            .filter_map(|r| match r {
                Request::Write { address, words, .. } => Some((*address, words.clone())),
                Request::Read { .. } => None,
            })
            .collect()
    }
}
