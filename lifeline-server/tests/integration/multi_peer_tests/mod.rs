mod test_late_join_catch_up_and_stop;
