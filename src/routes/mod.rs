//! Router Module Index
//!
//! The route table is split by access level. Both halves are merged into one router in
//! `create_router`; literal segments such as `/topic/create` always win over the
//! `{topicId}` capture, whichever half registers them.

/// Routes open to every visitor, signed in or not.
pub mod public;

/// Routes that require a signed-in session (topic authoring).
pub mod member;
