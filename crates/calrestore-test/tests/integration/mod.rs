mod errors;
mod scenarios;
mod subscriptions;
mod versions;
