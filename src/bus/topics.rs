//! Bus topics and their payload types.

use serde_json::Value;

use super::Topic;
use crate::contacts::Contact;
use crate::engine::{DisconnectReason, GroupUpdate};
use crate::normalize::NormalizedMessage;
use crate::session::SessionHandle;

/// `message`: a normalized inbound message
pub struct MessageReceived;

impl Topic for MessageReceived {
    type Payload = NormalizedMessage;
    const NAME: &'static str = "message";
}

/// `connected`: the session reached `Open`; carries the live handle
pub struct Connected;

impl Topic for Connected {
    type Payload = SessionHandle;
    const NAME: &'static str = "connected";
}

/// `disconnected`: the socket closed with a reason
pub struct Disconnected;

impl Topic for Disconnected {
    type Payload = DisconnectReason;
    const NAME: &'static str = "disconnected";
}

/// `call`: raw call-offer batch, forwarded as received
pub struct CallReceived;

impl Topic for CallReceived {
    type Payload = Vec<Value>;
    const NAME: &'static str = "call";
}

/// `group-update`: group membership change
pub struct GroupUpdated;

impl Topic for GroupUpdated {
    type Payload = GroupUpdate;
    const NAME: &'static str = "group-update";
}

/// `contacts-update`: contact records as reported
pub struct ContactsUpdated;

impl Topic for ContactsUpdated {
    type Payload = Vec<Contact>;
    const NAME: &'static str = "contacts-update";
}
