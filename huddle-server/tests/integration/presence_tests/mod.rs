mod test_presence_broadcast;
