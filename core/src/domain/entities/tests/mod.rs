mod access_token_tests;
