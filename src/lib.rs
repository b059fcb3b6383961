// plaid - server-driven stateful web components
//
// Architecture:
// - web: request scope, HTML rendering, event responses and the axum server
// - stateful: actionable components, action dispatch, dependency injection,
//   URL/cookie query sync and portal reloads
// - config / logging / cli: ambient setup for the binary
// - demo: TodoMVC built on the above

pub mod cli;
pub mod config;
pub mod demo;
pub mod error;
pub mod logging;
pub mod stateful;
pub mod web;
