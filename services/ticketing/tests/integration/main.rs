mod helpers;
mod router_test;
mod scheduler_test;
mod settlement_test;
