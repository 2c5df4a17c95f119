mod test_connect_registers_first;
mod test_reconnect;
mod test_send_when_closed;
