// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 syncsim contributors

use std::sync::Arc;

/// A peer's name, cheaply shared and cloned onto every message it sends.
pub type PeerId = Arc<str>;

/// The message taxonomy. `Reset`/`ResetAck` drive the synchronization FSM;
/// `Data` is a placeholder payload frame used only to exercise the
/// admit-or-not-ok logic of each state — fragment assembly/reassembly is
/// out of scope.
#[derive(Clone, Debug)]
pub enum Message {
    Reset {
        sender: PeerId,
        reset_number: u16,
    },
    ResetAck {
        sender: PeerId,
        reset_number: u16,
        ack_number: u16,
    },
    Data {
        sender: PeerId,
        fragment_id: u32,
        length: u32,
        payload: Arc<[u8]>,
        begin: bool,
        end: bool,
    },
}

impl Message {
    pub fn sender(&self) -> &PeerId {
        match self {
            Message::Reset { sender, .. } => sender,
            Message::ResetAck { sender, .. } => sender,
            Message::Data { sender, .. } => sender,
        }
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, Message::Reset { .. })
    }

    pub fn is_resetack(&self) -> bool {
        matches!(self, Message::ResetAck { .. })
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Message::Data { .. })
    }
}
