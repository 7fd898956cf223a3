mod count_map;
