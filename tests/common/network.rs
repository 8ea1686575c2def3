use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
};

use kauri_rs::{
    networking::{
        messages::{Contribution, Message, Proposal},
        network::{Network, NetworkError},
    },
    types::data_types::ReplicaID,
};

/// A mock network stub which passes serialized messages from and to threads using channels.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    me: ReplicaID,
    all_peers: HashMap<ReplicaID, Sender<(ReplicaID, Vec<u8>)>>,
    inbox: Arc<Mutex<Receiver<(ReplicaID, Vec<u8>)>>>,
}

impl NetworkStub {
    fn send(&self, peer: ReplicaID, message: Message) -> Result<(), NetworkError> {
        let bytes = message.to_bytes()?;
        let sender = self
            .all_peers
            .get(&peer)
            .ok_or(NetworkError::UnknownPeer(peer))?;
        sender
            .send((self.me, bytes))
            .map_err(|_| NetworkError::Disconnected(peer))
    }

    /// Every message waiting in the inbox, without going through [`Network::recv`].
    pub(crate) fn drain(&mut self) -> Vec<(ReplicaID, Message)> {
        let mut messages = Vec::new();
        while let Some(message) = self.recv() {
            messages.push(message);
        }
        messages
    }
}

impl Network for NetworkStub {
    fn send_proposal(&mut self, peers: &[ReplicaID], proposal: Proposal) -> Result<(), NetworkError> {
        if peers.is_empty() {
            return Err(NetworkError::EmptyGroup);
        }
        // Keep sending to the rest of the group if one peer is gone.
        let mut result = Ok(());
        for peer in peers {
            if let Err(err) = self.send(*peer, Message::from(proposal.clone())) {
                result = Err(err);
            }
        }
        result
    }

    fn send_contribution(
        &mut self,
        peer: ReplicaID,
        contribution: Contribution,
    ) -> Result<(), NetworkError> {
        self.send(peer, Message::from(contribution))
    }

    fn recv(&mut self) -> Option<(ReplicaID, Message)> {
        match self.inbox.lock().unwrap().try_recv() {
            Ok((origin, bytes)) => Some((origin, Message::from_bytes(&bytes).unwrap())),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => panic!(),
        }
    }
}

pub(crate) fn mock_network(peers: impl Iterator<Item = ReplicaID>) -> Vec<NetworkStub> {
    let mut all_peers = HashMap::new();
    let peer_and_inboxes: Vec<(ReplicaID, Receiver<(ReplicaID, Vec<u8>)>)> = peers
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            all_peers.insert(peer, sender);

            (peer, receiver)
        })
        .collect();

    peer_and_inboxes
        .into_iter()
        .map(|(me, inbox)| NetworkStub {
            me,
            all_peers: all_peers.clone(),
            inbox: Arc::new(Mutex::new(inbox)),
        })
        .collect()
}
