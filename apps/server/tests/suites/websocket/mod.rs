mod connection_tests;
mod game_flow_tests;
mod reconnect_tests;
