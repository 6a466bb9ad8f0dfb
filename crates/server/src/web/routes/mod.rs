pub mod probe_routes;
