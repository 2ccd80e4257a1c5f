mod runtime;

mod test_connection;
mod test_routes;
