mod helpers;

mod reconcile_tests;
