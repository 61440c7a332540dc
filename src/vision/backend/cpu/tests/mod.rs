mod conv_tests;
mod dense_tests;
