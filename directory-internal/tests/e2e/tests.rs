mod redis_quota;
